mod args;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ticket_queue::config::Config;
use ticket_queue::rate_limiter::RateLimiter;
use ticket_queue::server;
use ticket_queue::store::MemoryStore;
use ticket_queue::submission::Submitter;
use ticket_queue::worker::{SimulatedExecutor, Worker};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::{select, signal};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Level};

use crate::args::Args;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Logging
    if args.debug {
        tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .init();
    } else {
        tracing_subscriber::fmt().json().init();
    }

    let config = match args.config() {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "invalid configuration");
            return ExitCode::from(2);
        },
    };

    let store = match &args.state_file {
        Some(path) => MemoryStore::open(path),
        None => Ok(MemoryStore::new()),
    };
    let store = match store {
        Ok(store) => Arc::new(store),
        Err(error) => {
            error!(%error, "cannot open job store");
            return ExitCode::FAILURE;
        },
    };

    // Jobs a previous process left running must be back in the queue before
    // the worker looks at it.
    let wake = Arc::new(Notify::new());
    let worker = Worker::new(
        store.clone(),
        SimulatedExecutor {
            work: config.simulated_work(),
        },
        config.idle_poll_interval(),
    )
    .with_wake(wake.clone());
    if let Err(error) = worker.recover() {
        error!(%error, "restart recovery failed");
        return ExitCode::FAILURE;
    }

    let submitter = Arc::new(
        Submitter::new(
            store,
            RateLimiter::new(
                config.global_rate_limit,
                config.per_owner_rate_limit,
                config.window(),
            ),
        )
        .with_wake(wake),
    );

    // Cancellation and termination channel.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(error) = signal::ctrl_c().await {
                warn!(%error, "something strange with ctrl-c handling!");
            };
            cancel.cancel();
        });
    }

    let (shutdown_hold, mut shutdown_wait) = mpsc::channel::<()>(1);

    {
        let cancel = cancel.clone();
        let hold = shutdown_hold.clone();
        tokio::spawn(async move {
            worker.run(cancel).await;
            drop(hold);
        });
    }

    let exit_code = if let Err(error) =
        begin(args, config, submitter, cancel.clone(), shutdown_hold).await
    {
        error!(%error, "encountered runtime error");
        cancel.cancel();
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    };

    shutdown_wait.recv().await;

    exit_code
}

async fn begin(
    args: Args,
    config: Config,
    submitter: Arc<Submitter<MemoryStore>>,
    cancel: CancellationToken,
    shutdown_hold: mpsc::Sender<()>,
) -> Result<()> {
    let listener = TcpListener::bind((args.listen, args.port))
        .await
        .context("binding listener")?;
    info!(addr = %listener.local_addr()?, "listening");

    // Accept incoming connections until an exit signal is sent, and handle each
    // connection as its own task.
    loop {
        let conn = match select! {
            accept = listener.accept() => accept,
            _ = cancel.cancelled() => break,
        } {
            Ok((conn, _)) => conn,
            Err(error) => {
                warn!(%error, "failed to accept connection");
                continue;
            },
        };

        tokio::spawn(begin_handle(
            cancel.clone(),
            shutdown_hold.clone(),
            submitter.clone(),
            config.max_payload_size,
            conn,
        ));
    }

    Ok(())
}

#[instrument(name = "handle", err, fields(peer = %conn.peer_addr()?), skip_all)]
async fn begin_handle(
    cancel: CancellationToken,
    _shutdown_hold: mpsc::Sender<()>,
    submitter: Arc<Submitter<MemoryStore>>,
    max_payload_size: u32,
    mut conn: TcpStream,
) -> Result<()> {
    debug!("accepted connection");

    conn.set_nodelay(true).context("setting NODELAY")?;

    let (r, w) = conn.split();
    let ret = server::serve(cancel, &submitter, max_payload_size, r, w)
        .await
        .context("serving connection");

    conn.shutdown().await.context("during shutdown")?;

    debug!("closed connection");

    ret
}
