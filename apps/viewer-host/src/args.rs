// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command-line parsing.

use std::path::PathBuf;

/// One control panel interaction, run in command-line order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    LoadSample,
    LoadUrl(String),
    LoadFile(PathBuf),
    Download,
    RenderFrames(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Run(Vec<Action>),
}

/// Parse arguments, excluding the program name.
pub fn parse_args<I>(args: I) -> Result<Command, String>
where
    I: IntoIterator<Item = String>,
{
    let args: Vec<String> = args.into_iter().collect();
    let mut actions = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => return Ok(Command::Help),
            "--sample" => actions.push(Action::LoadSample),
            "--download" => actions.push(Action::Download),
            "--url" => {
                i += 1;
                let url = args.get(i).ok_or("--url needs a value")?;
                actions.push(Action::LoadUrl(url.clone()));
            }
            "--frames" => {
                i += 1;
                let value = args.get(i).ok_or("--frames needs a value")?;
                let count = value
                    .parse()
                    .map_err(|_| format!("Invalid frame count: {value}"))?;
                actions.push(Action::RenderFrames(count));
            }
            other if other.starts_with("--") => return Err(format!("Unknown option: {other}")),
            path => actions.push(Action::LoadFile(PathBuf::from(path))),
        }
        i += 1;
    }

    Ok(Command::Run(actions))
}

pub fn usage() -> &'static str {
    "Usage: ifc-lite-viewer [actions...]

Actions run in the order given:
  <file.ifc>          Load a local IFC file
  --url <URL>         Load an IFC file from a URL
  --sample            Load the sample model (VIEWER_SAMPLE_URL)
  --download          Write the first model's fragments to VIEWER_EXPORT_DIR
  --frames <n>        Render n frames
  -h, --help          Show this message"
}
