//! authcalc-client: interactive terminal client for authcalc-server.
//!
//! Usage: `authcalc-client [host [port]] [--verbose]`

use authcalc::client::{ClientAction, ClientEvent, ClientSession, ClientState};
use authcalc::config::{parse_port, DEFAULT_PORT};
use authcalc::protocol::DELIMITER;
use clap::Parser;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Command-line arguments for the client
#[derive(Parser, Debug)]
#[command(name = "authcalc-client")]
#[command(version = "0.1.0")]
#[command(about = "Interactive client for authcalc-server", long_about = None)]
struct ClientArgs {
    /// Server host name or address
    #[arg(default_value = "localhost")]
    host: String,

    /// Server port (1-65535, default 1337)
    #[arg(allow_negative_numbers = true)]
    port: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Log connection activity
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ClientArgs::parse();

    let level = if args.verbose {
        "debug"
    } else {
        args.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let port = match args.port.as_deref() {
        Some(arg) => parse_port(arg).unwrap_or_else(|| {
            warn!(port = %arg, "Invalid port number. Using default port {}.", DEFAULT_PORT);
            DEFAULT_PORT
        }),
        None => DEFAULT_PORT,
    };

    let stream = connect(&args.host, port)?;
    debug!(host = %args.host, port, "Connected");

    let stdin = io::stdin();
    let stdout = io::stdout();
    run(stream, stdin.lock(), stdout.lock())?;
    Ok(())
}

fn connect(host: &str, port: u16) -> io::Result<TcpStream> {
    let mut last_err = io::Error::new(
        io::ErrorKind::NotFound,
        format!("no address for {host}:{port}"),
    );
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

/// Drive the session: one frame while awaiting a response, one line of
/// input while awaiting input.
fn run(stream: TcpStream, mut input: impl BufRead, mut output: impl Write) -> io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    let mut session = ClientSession::new();

    loop {
        let event = match session.state() {
            ClientState::AwaitingResponse => {
                let mut frame = Vec::new();
                if reader.read_until(DELIMITER, &mut frame)? == 0 {
                    writeln!(output, "Server closed connection")?;
                    return Ok(());
                }
                if frame.last() == Some(&DELIMITER) {
                    frame.pop();
                }
                if frame.is_empty() {
                    continue;
                }
                ClientEvent::Frame(frame)
            }
            ClientState::AwaitingInput => {
                let mut line = String::new();
                if input.read_line(&mut line)? == 0 {
                    return Ok(());
                }
                ClientEvent::Line(line)
            }
        };

        for action in session.handle(event) {
            match action {
                ClientAction::Send(request) => {
                    let mut bytes = serde_json::to_vec(&request)?;
                    bytes.push(DELIMITER);
                    writer.write_all(&bytes)?;
                    debug!(bytes = bytes.len(), "Sent request");
                }
                ClientAction::Display(text) => writeln!(output, "{text}")?,
                ClientAction::Quit => return Ok(()),
            }
        }
        output.flush()?;
    }
}
