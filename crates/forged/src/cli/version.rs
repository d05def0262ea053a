use clap::Parser;

/// Print build and protocol version information
#[derive(Debug, Parser)]
pub struct VersionCommand;

impl VersionCommand {
    pub fn run(self) {
        println!("{}", forge_version::version_info());
    }
}
