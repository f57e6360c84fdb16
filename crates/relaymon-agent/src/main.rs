use relaymon_agent::supervisor::{self, CmdlineArgs};

fn print_usage() {
    eprintln!("Usage: relaymon-agent [-c <config.json>] [-v] [-p <pidfile>]");
    eprintln!("  -c <path>  Configuration file (default: config.json)");
    eprintln!("  -v         Verbose: log to stdout at debug level");
    eprintln!("  -p <path>  Pid file location");
}

fn parse_cmdline(mut args: impl Iterator<Item = String>) -> Result<CmdlineArgs, String> {
    let mut parsed = CmdlineArgs {
        config_file: "config.json".into(),
        verbose: false,
        pid_file: "<none>".into(),
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" => {
                parsed.config_file = args.next().ok_or("-c requires a path")?;
            }
            "-v" => parsed.verbose = true,
            "-p" => {
                parsed.pid_file = args.next().ok_or("-p requires a path")?;
            }
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    Ok(parsed)
}

#[tokio::main]
async fn main() {
    let args = match parse_cmdline(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            print_usage();
            std::process::exit(2);
        }
    };

    if let Err(e) = supervisor::run(args).await {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}
