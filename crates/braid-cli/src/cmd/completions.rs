use anyhow::Result;
use clap::Args;
use clap_complete::{Shell, generate};
use std::io::Write;

/// Arguments for `braid completions`.
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell for completion script generation.
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Generate the completion script for `command` to stdout.
///
/// # Errors
///
/// Returns an error if writing to stdout fails.
pub fn run_completions(shell: Shell, command: &mut clap::Command) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_completions(shell, command, &mut out);
    out.flush()?;
    Ok(())
}

fn write_completions(shell: Shell, command: &mut clap::Command, out: &mut dyn Write) {
    let bin = command.get_name().to_string();
    generate(shell, command, bin, out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bash_script_names_the_binary() {
        let mut command = clap::Command::new("braid").subcommand(clap::Command::new("fuse"));
        let mut buf = Vec::new();
        write_completions(Shell::Bash, &mut command, &mut buf);
        let script = String::from_utf8(buf).expect("utf8");
        assert!(script.contains("braid"));
        assert!(script.contains("fuse"));
    }
}
