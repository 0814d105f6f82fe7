//! The Acceptor (spec §4.4): binds the listening socket, spawns one
//! dispatch loop per accepted connection, and drives graceful shutdown.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use log::{error, info, warn};
use tokio::net::TcpListener;
#[cfg(not(windows))]
use tokio::signal::unix::{signal as unix_signal, SignalKind};
#[cfg(windows)]
use tokio::signal::windows as win_signal;
use tokio::runtime::Builder;

use crate::app::args::Args;
use crate::config::Config;
use crate::dispatcher::{Dispatcher, DispatcherConfig, Ended};
use crate::handlers::DefaultHandlers;
use crate::registry::{random_secret_key, Registry, BACKEND_PID};
use crate::session::{BackendKey, CancelFlag};
use crate::utils::format_duration;

/// Clients currently connected; consulted by the shutdown drain loop.
pub static CURRENT_CLIENT_COUNT: AtomicI64 = AtomicI64::new(0);

pub fn run_server(_args: Args, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Builder::new_multi_thread()
        .worker_threads(config.general.worker_threads)
        .enable_all()
        .thread_name("pg-wire-emulator-worker")
        .build()?;

    runtime.block_on(async move { serve(config).await })
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.general.host, config.general.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {addr}");
    config.show();

    let registry = Registry::new(config.general.worker_threads);
    let shutdown = CancelFlag::new();

    let dispatcher_config = Arc::new(build_dispatcher_config(&config));

    #[cfg(not(windows))]
    let mut term_signal = unix_signal(SignalKind::terminate())?;
    #[cfg(not(windows))]
    let mut interrupt_signal = unix_signal(SignalKind::interrupt())?;
    #[cfg(not(windows))]
    let mut hup_signal = unix_signal(SignalKind::hangup())?;
    #[cfg(windows)]
    let mut interrupt_signal = win_signal::ctrl_c()?;

    let log_client_connections = config.general.log_client_connections;
    let max_connections = config.general.max_connections;
    let shutdown_timeout = config.general.shutdown_timeout_ms.as_std();

    loop {
        tokio::select! {
            #[cfg(not(windows))]
            _ = hup_signal.recv() => {
                info!("Reloading configuration");
                if let Err(err) = crate::config::reload_config().await {
                    error!("Config reload error: {err}");
                }
            }

            _ = interrupt_signal.recv() => {
                info!("Got interrupt, starting graceful shutdown");
                break;
            }

            #[cfg(not(windows))]
            _ = term_signal.recv() => {
                info!("Got terminate, starting graceful shutdown");
                break;
            }

            accepted = listener.accept() => {
                let (socket, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        error!("accept error: {err}");
                        continue;
                    }
                };

                let current = CURRENT_CLIENT_COUNT.fetch_add(1, Ordering::SeqCst);
                if current as u64 >= max_connections {
                    CURRENT_CLIENT_COUNT.fetch_sub(1, Ordering::SeqCst);
                    warn!("Client {addr}: too many clients already, refusing connection");
                    drop(socket);
                    continue;
                }

                let _ = socket.set_nodelay(true);

                let registry = registry.clone();
                let shutdown = shutdown.clone();
                let dispatcher_config = dispatcher_config.clone();

                tokio::task::spawn(async move {
                    let key = BackendKey {
                        backend_pid: BACKEND_PID.next(),
                        secret_key: random_secret_key(),
                    };
                    let mut socket = socket;
                    let start = std::time::Instant::now();

                    let mut dispatcher = Dispatcher::new(DefaultHandlers::new(), (*dispatcher_config).clone());
                    let result = dispatcher.run(&mut socket, registry, key, &shutdown).await;

                    CURRENT_CLIENT_COUNT.fetch_sub(1, Ordering::SeqCst);

                    let elapsed = chrono::Duration::from_std(start.elapsed()).unwrap_or_default();
                    match result {
                        Ok(Ended::Closed) | Ok(Ended::ShutDown) => {
                            if log_client_connections {
                                info!("Client {addr} disconnected, session duration: {}", format_duration(&elapsed));
                            }
                        }
                        Err(err) => {
                            warn!("Client {addr} disconnected with error {err}, duration: {}", format_duration(&elapsed));
                        }
                    }
                });
            }
        }
    }

    shutdown.request();
    info!("Waiting up to {:?} for active connections to drain", shutdown_timeout);
    let drain_deadline = tokio::time::Instant::now() + shutdown_timeout;
    while CURRENT_CLIENT_COUNT.load(Ordering::SeqCst) > 0 && tokio::time::Instant::now() < drain_deadline {
        tokio::time::sleep(StdDuration::from_millis(50)).await;
    }
    let remaining = CURRENT_CLIENT_COUNT.load(Ordering::SeqCst);
    if remaining > 0 {
        warn!("Shutdown timeout elapsed with {remaining} client(s) still connected");
    } else {
        info!("All clients disconnected, shutting down");
    }

    Ok(())
}

fn build_dispatcher_config(config: &Config) -> DispatcherConfig {
    let idle_timeout = if config.general.idle_timeout_ms.as_micros() == 0 {
        None
    } else {
        Some(config.general.idle_timeout_ms.as_std())
    };

    DispatcherConfig {
        message_size_limit: config.general.message_size_limit.as_usize(),
        auth_method: config.general.auth_method,
        auth_password: config.general.auth_password.clone(),
        server_parameters: config.general.server_parameters(),
        idle_timeout,
    }
}
