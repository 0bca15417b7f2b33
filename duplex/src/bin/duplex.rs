//! Two-party UDP chat.
//!
//! # Usage
//!
//! ```sh
//! duplex 9001 peer.example.org 9002
//! ```
//!
//! Type lines to send them. A line holding only `!` ends the session on both
//! sides, as does closing standard input.

use clap::Parser;

use duplex::net::{ResolveError, resolve_ipv4};
use duplex::session::{
    DEFAULT_QUEUE_CAPACITY, Session, SessionConfig, SessionError, SessionIo, ShutdownReport,
};
use duplex::stdio::Console;

const RULE: &str = "----------------------------------------";

/// Chat with one peer over UDP.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Local UDP port to listen on.
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    local_port: u16,

    /// Host name or IPv4 address of the peer.
    remote_host: String,

    /// UDP port the peer listens on.
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    remote_port: u16,

    /// Messages that may wait to be sent before new ones are dropped.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY, value_parser = parse_capacity)]
    outbound_capacity: usize,

    /// Messages that may wait to be shown before new ones are dropped.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY, value_parser = parse_capacity)]
    inbound_capacity: usize,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    /// The peer's host name did not resolve.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// The session could not start.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// The stdin wakeup pipe could not be created.
    #[error("failed to set up standard input: {0}")]
    Stdin(#[source] std::io::Error),
}

fn parse_capacity(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("capacity must be at least 1".into()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(1);
        }
        Err(e) => e.exit(),
    };

    duplex::init_tracing();

    match run(&cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("duplex: {e}");
            std::process::exit(1);
        }
    }
}

/// Runs one session. Returns `false` if shutdown did not finish.
fn run(cli: &Cli) -> Result<bool, CliError> {
    let config = SessionConfig {
        local_port: cli.local_port,
        remote: resolve_ipv4(&cli.remote_host, cli.remote_port)?,
        outbound_capacity: cli.outbound_capacity,
        inbound_capacity: cli.inbound_capacity,
    };

    let io = SessionIo::stdio().map_err(CliError::Stdin)?;
    let console = io.console.clone();
    let session = Session::start_announced(&config, io, |console| announce(console, cli))?;

    Ok(finish(&console, session.wait_for_completion()))
}

fn announce(console: &Console, cli: &Cli) {
    console.notice(RULE);
    console.notice("duplex session started");
    console.notice(format_args!("Our port: {}", cli.local_port));
    console.notice(format_args!("Remote hostname: {}", cli.remote_host));
    console.notice(format_args!("Remote port: {}", cli.remote_port));
    console.notice(RULE);
}

/// Prints the closing banner. The last line is always `Shutdown is complete.`
fn finish(console: &Console, outcome: Result<ShutdownReport, SessionError>) -> bool {
    console.notice(RULE);
    let finished = match outcome {
        Ok(report) => {
            for line in report.diagnostics() {
                console.notice(line);
            }
            true
        }
        Err(e) => {
            console.notice(format_args!("**Shutdown did not finish: {e}**"));
            false
        }
    };
    console.notice("Shutdown is complete.");
    finished
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use duplex::net::endpoint::CloseOutcome;
    use duplex::session::ShutdownError;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_ports_out_of_range_rejected() {
        assert!(Cli::try_parse_from(["duplex", "0", "localhost", "9002"]).is_err());
        assert!(Cli::try_parse_from(["duplex", "9001", "localhost", "65536"]).is_err());
        assert!(Cli::try_parse_from(["duplex", "x", "localhost", "9002"]).is_err());
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["duplex", "9001", "localhost", "9002"]).unwrap();
        assert_eq!(cli.local_port, 9001);
        assert_eq!(cli.remote_host, "localhost");
        assert_eq!(cli.outbound_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(cli.inbound_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(
            Cli::try_parse_from(["duplex", "9001", "localhost", "9002", "--inbound-capacity", "0"])
                .is_err()
        );
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[test]
    fn test_clean_shutdown_ends_with_completion_line() {
        let capture = Capture::default();
        let report = ShutdownReport {
            workers: Vec::new(),
            endpoint: Ok(CloseOutcome::Closed),
        };

        assert!(finish(&Console::new(capture.clone()), Ok(report)));
        assert_eq!(capture.text().lines().last(), Some("Shutdown is complete."));
    }

    #[test]
    fn test_failed_shutdown_still_ends_with_completion_line() {
        let capture = Capture::default();
        let outcome = Err(SessionError::Shutdown(ShutdownError::HelperPanicked));

        assert!(!finish(&Console::new(capture.clone()), outcome));
        let text = capture.text();
        assert!(text.contains("shutdown thread panicked"), "{text}");
        assert_eq!(text.lines().last(), Some("Shutdown is complete."));
    }
}
