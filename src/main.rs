use specmap::cli;

fn main() -> anyhow::Result<()> {
    if let Err(e) = cli::run() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use specmap::cli::{Command, SpecmapCli};

    #[test]
    fn run_command_honors_flags() {
        let cli = SpecmapCli::parse_from(["specmap", "run", "--keys", "4", "--perf-map", "--json"]);
        match cli.command() {
            Command::Run {
                keys,
                frames,
                perf_map,
                ..
            } => {
                assert_eq!(*keys, 4);
                assert_eq!(*frames, 60);
                assert!(*perf_map);
            }
            other => panic!("expected run command, got {other:?}"),
        }
    }

    #[test]
    fn verbose_flag_is_global() {
        let cli = SpecmapCli::parse_from(["specmap", "config", "-v"]);
        assert!(cli.verbose());
        assert!(matches!(cli.command(), Command::Config));

        let quiet = SpecmapCli::parse_from(["specmap", "config"]);
        assert!(!quiet.verbose());
    }
}
