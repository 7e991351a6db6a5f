use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use hgipc_client::{Client, Event};
use tracing::info;

use crate::cmd::{ListenArgs, Session};
use crate::exit::{client_error, CliError, CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::print_event;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Print events until interrupted or `--count` is reached, reconnecting
/// whenever the hub restarts.
pub fn run(args: ListenArgs, session: &Session) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let (tx, rx) = mpsc::channel::<Event>();
    let config = session
        .config()
        .on_event(move |event: &Event| {
            let _ = tx.send(event.clone());
        })
        .on_connect(|| info!("listening for hub events"));
    let client = Client::connect(config).map_err(|err| client_error("connect failed", err))?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let event = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => {
                if client.state().is_terminal() {
                    return Err(CliError::new(
                        TRANSPORT_ERROR,
                        format!("lost connection to {}", client.socket_path().display()),
                    ));
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if let Some(peers) = &args.peers {
            if !peers.contains(&event.peer_id) {
                continue;
            }
        }

        print_event(&event, session.format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    client.close();
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
