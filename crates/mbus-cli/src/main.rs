//! # mbus CLI Entry Point
//!
//! Demo binary for the mbus network layer. Provides a command-line interface
//! for running an echo node and for delivering single messages to a running
//! node from the shell.
//!
//! ## Usage
//!
//! ```bash
//! # Run an echo node on a fixed port
//! mbus serve -p 4086
//!
//! # Send a message and print the echoed reply
//! mbus send tcp/127.0.0.1:4086/main "hello out there"
//!
//! # Same, with the delivery trace printed to stderr
//! mbus send --trace tcp/127.0.0.1:4086/main "hello"
//! ```
//!
//! ## Address Format
//!
//! `send` dials a literal address of the form `tcp/HOST:PORT/SESSION`:
//! - ✅ `tcp/127.0.0.1:4086/main`
//! - ❌ `127.0.0.1:4086`

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use tokio::sync::oneshot;

use mbus_net::simple::SIMPLE_PROTOCOL;
use mbus_net::{
    Identity, LocalMirror, Message, Network, NetworkOwner, NetworkParams, Protocol, Reply,
    RoutingNode, SimpleProtocol,
};

/// Validates that a send address is a literal `tcp/` pattern.
///
/// # Arguments
///
/// * `address` - The address string to validate
///
/// # Errors
///
/// Returns an error unless the address looks like `tcp/HOST:PORT/SESSION`.
fn validate_send_address(address: &str) -> Result<()> {
    let body = address.strip_prefix("tcp/").unwrap_or_default();
    if body.contains(':') && body.contains('/') {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "Invalid address: '{}' must look like tcp/HOST:PORT/SESSION",
            address
        ))
    }
}

/// Main CLI structure parsed from command-line arguments.
///
/// Uses `argh` for declarative argument parsing. The top-level command
/// dispatches to one of the two subcommands: serve or send.
#[derive(FromArgs)]
/// mbus - message bus network layer demo
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// Each variant represents a distinct operational mode:
///
/// - **Serve**: Run an echo node that answers every message with its payload
/// - **Send**: Deliver one message and print the reply (unix-friendly output)
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Send(SendArgs),
}

/// Arguments for running an echo node.
///
/// An echo node listens on the configured port, registers one session under
/// its service prefix, and answers every message by returning the payload
/// unchanged. It runs until interrupted with Ctrl-C.
///
/// # Example
///
/// ```bash
/// mbus serve -p 4086 --prefix search -s shard-0
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// run an echo node
struct ServeArgs {
    /// hostname advertised in the node's listen spec
    ///
    /// Senders dial `tcp/<host>:<port>/<session>`, so this must be a name
    /// they can resolve. Defaults to "127.0.0.1" for local experiments.
    #[argh(option, default = "\"127.0.0.1\".into()")]
    host: String,

    /// TCP port to listen on
    ///
    /// Defaults to 0, which picks a free port. The actual listen spec is
    /// logged at startup.
    #[argh(option, short = 'p', default = "0")]
    port: u16,

    /// service prefix the node registers under
    ///
    /// The session appears in the name service as `<prefix>/<session>`.
    /// Defaults to "echo".
    #[argh(option, default = "\"echo\".into()")]
    prefix: String,

    /// session name to register
    ///
    /// Also the last component of the address senders dial.
    /// Defaults to "main".
    #[argh(option, short = 's', default = "\"main\".into()")]
    session: String,
}

/// Arguments for sending a single message.
///
/// The `send` command delivers one message to a running node and prints the
/// reply payload to stdout. This makes it suitable for scripting and
/// integration with other tools.
///
/// # Output Format
///
/// The reply payload goes to stdout as text. Reply errors are reported to
/// stderr with a non-zero exit code.
///
/// # Examples
///
/// ```bash
/// # Send and print the reply
/// mbus send tcp/127.0.0.1:4086/main "hello"
///
/// # Allow three seconds, then give up
/// mbus send -t 3 tcp/127.0.0.1:4086/main "hello"
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "send")]
/// send one message and print the reply
struct SendArgs {
    /// address of the session to send to
    ///
    /// Must be a literal address of the form `tcp/HOST:PORT/SESSION`
    /// (e.g. tcp/127.0.0.1:4086/main); no name service is consulted.
    #[argh(positional)]
    address: String,

    /// message text to deliver
    #[argh(positional)]
    text: String,

    /// seconds to wait for the reply
    ///
    /// Covers connection setup, version negotiation and the call itself.
    /// Defaults to 10 seconds.
    #[argh(option, short = 't', long = "timeout", default = "10")]
    timeout_secs: u64,

    /// print the delivery trace to stderr
    ///
    /// Asks the receiving node to record trace notes and prints whatever
    /// comes back alongside the reply.
    #[argh(switch)]
    trace: bool,
}

/// Owner that answers every message by returning its payload unchanged.
///
/// `serve` wires the running [`Network`] in after construction; `send`
/// leaves it empty and only uses the protocol lookup.
struct EchoOwner {
    net: OnceLock<Arc<Network>>,
    protocol: Arc<dyn Protocol>,
}

impl EchoOwner {
    fn new() -> Arc<Self> {
        Arc::new(EchoOwner {
            net: OnceLock::new(),
            protocol: Arc::new(SimpleProtocol),
        })
    }
}

impl NetworkOwner for EchoOwner {
    fn protocol(&self, name: &str) -> Option<Arc<dyn Protocol>> {
        if name == self.protocol.name() {
            Some(Arc::clone(&self.protocol))
        } else {
            None
        }
    }

    fn deliver_message(&self, session: &str, message: Message) {
        let Some(net) = self.net.get() else { return };
        tracing::info!("Echoing {} bytes for session '{}'", message.payload.len(), session);
        let payload = message.payload.clone();
        let mut reply = message.create_reply();
        reply.payload = payload;
        net.reply(reply);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Initialize tracing only for the serve command
    // - send: keep output clean for unix tool usage (piping, scripting)
    if !matches!(cli.command, Commands::Send(_)) {
        // Set default log level to INFO, but allow RUST_LOG env var to override
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    match cli.command {
        Commands::Serve(args) => {
            tracing::info!("Starting mbus echo node");
            tracing::info!("Service prefix: {}, session: {}", args.prefix, args.session);

            let mirror = Arc::new(LocalMirror::new());
            let mut params = NetworkParams::new(Identity::new(args.host, args.prefix));
            params.listen_port = args.port;

            let owner = EchoOwner::new();
            let net = Network::new(params, mirror.clone(), mirror);
            let _ = owner.net.set(Arc::clone(&net));
            let dyn_owner: Arc<dyn NetworkOwner> = owner;
            net.attach(&dyn_owner);
            net.start().await?;
            net.register_session(&args.session);

            if let Some(spec) = net.listen_spec() {
                tracing::info!("Send with: mbus send tcp/{}/{} 'hello mbus'", spec, args.session);
            }

            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutting down");
            net.shutdown().await;

            Ok(())
        }
        Commands::Send(args) => run_send(args).await,
    }
}

/// Executes the `send` subcommand.
///
/// This function:
/// 1. Builds a client-only network (no listener, no name service entries)
/// 2. Binds a connection to the literal `tcp/...` address
/// 3. Sends one message and waits for the reply
/// 4. Prints the reply payload to stdout
///
/// No tracing/logging is initialized for this command to keep stdout clean
/// for unix tool usage; reply errors go to stderr instead.
///
/// # Errors
///
/// Returns an error if the address is malformed, the peer is unreachable,
/// or the reply carries errors.
async fn run_send(args: SendArgs) -> Result<()> {
    validate_send_address(&args.address)?;

    let mirror = Arc::new(LocalMirror::new());
    let params = NetworkParams::new(Identity::new("127.0.0.1", ""));
    let owner = EchoOwner::new();
    let net = Network::new(params, mirror.clone(), mirror);
    let dyn_owner: Arc<dyn NetworkOwner> = owner;
    net.attach(&dyn_owner);

    let (tx, rx) = oneshot::channel::<Reply>();
    let mut node = RoutingNode::new(args.address.as_str(), Box::new(tx));
    if net.alloc_service_address(&mut node).await {
        let mut message = Message::new(SIMPLE_PROTOCOL, "", args.text.into_bytes());
        message.time_remaining = Duration::from_secs(args.timeout_secs);
        if args.trace {
            message.trace.level = 1;
        }
        net.send(message, vec![node]);
    }

    // A failed alloc already delivered its error reply through the channel.
    let reply = rx.await.map_err(|_| anyhow::anyhow!("Reply channel closed"))?;
    net.shutdown().await;

    if args.trace && !reply.trace.is_empty() {
        eprintln!("{}", reply.trace.render());
    }
    for error in &reply.errors {
        eprintln!("{}", error);
    }
    if !reply.is_ok() {
        return Err(anyhow::anyhow!("Send to {} failed", args.address));
    }
    println!("{}", String::from_utf8_lossy(&reply.payload));

    Ok(())
}

/// CLI argument parsing tests.
///
/// Tests verify that `argh` correctly parses both subcommands and their
/// arguments. Each test simulates command-line invocation and validates
/// the resulting structure.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_serve_defaults() {
        let args: Cli = Cli::from_args(&["mbus"], &["serve"]).unwrap();
        match args.command {
            Commands::Serve(ServeArgs {
                host,
                port,
                prefix,
                session,
            }) => {
                assert_eq!(host, "127.0.0.1"); // default
                assert_eq!(port, 0); // default: pick a free port
                assert_eq!(prefix, "echo"); // default
                assert_eq!(session, "main"); // default
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_parse_serve_custom() {
        let args: Cli = Cli::from_args(
            &["mbus"],
            &[
                "serve",
                "-p",
                "4086",
                "--host",
                "10.0.0.7",
                "--prefix",
                "search",
                "-s",
                "shard-0",
            ],
        )
        .unwrap();
        match args.command {
            Commands::Serve(ServeArgs {
                host,
                port,
                prefix,
                session,
            }) => {
                assert_eq!(host, "10.0.0.7");
                assert_eq!(port, 4086);
                assert_eq!(prefix, "search");
                assert_eq!(session, "shard-0");
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_parse_send() {
        let args: Cli =
            Cli::from_args(&["mbus"], &["send", "tcp/127.0.0.1:4086/main", "hello"]).unwrap();
        match args.command {
            Commands::Send(SendArgs {
                address,
                text,
                timeout_secs,
                trace,
            }) => {
                assert_eq!(address, "tcp/127.0.0.1:4086/main");
                assert_eq!(text, "hello");
                assert_eq!(timeout_secs, 10); // default
                assert!(!trace);
            }
            _ => panic!("Expected Send command"),
        }
    }

    #[test]
    fn test_cli_parse_send_with_timeout_and_trace() {
        let args: Cli = Cli::from_args(
            &["mbus"],
            &[
                "send",
                "-t",
                "3",
                "--trace",
                "tcp/127.0.0.1:4086/main",
                "hello",
            ],
        )
        .unwrap();
        match args.command {
            Commands::Send(SendArgs {
                timeout_secs,
                trace,
                ..
            }) => {
                assert_eq!(timeout_secs, 3);
                assert!(trace);
            }
            _ => panic!("Expected Send command"),
        }
    }

    #[test]
    fn test_send_address_validation() {
        assert!(validate_send_address("tcp/127.0.0.1:4086/main").is_ok());
        assert!(validate_send_address("127.0.0.1:4086").is_err());
        assert!(validate_send_address("tcp/127.0.0.1:4086").is_err()); // session missing
        assert!(validate_send_address("tcp/localhost/main").is_err()); // port missing
    }
}
