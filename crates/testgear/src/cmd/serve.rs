use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use testgear_plugin::{ChainLoader, LoaderConfig, ProviderRegistry};
use testgear_session::{serve_stream, Dispatcher};
use testgear_transport::{Stream, TcpTransport, TransportError};
use testgear_wire::WireConfig;
use tracing::{info, warn};

use crate::cmd::{parse_duration, Connection, ServeArgs};
use crate::exit::{
    plugin_error, session_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE,
};

/// Bound listener for whichever connection type was selected.
enum Listener {
    Tcp(TcpTransport),
    #[cfg(unix)]
    Unix(testgear_transport::UnixDomainSocket),
}

impl Listener {
    fn bind(args: &ServeArgs) -> CliResult<Self> {
        match args.connection {
            Connection::Tcp => {
                let addr = format!("{}:{}", args.bind, args.port);
                let listener =
                    TcpTransport::bind(&addr).map_err(|err| transport_error("bind failed", err))?;
                info!(addr = %listener.local_addr(), "listening");
                Ok(Listener::Tcp(listener))
            }
            #[cfg(unix)]
            Connection::Unix => {
                let path = args.socket.as_ref().ok_or_else(|| {
                    CliError::new(USAGE, "--socket is required with --connection unix")
                })?;
                let listener = testgear_transport::UnixDomainSocket::bind(path)
                    .map_err(|err| transport_error("bind failed", err))?;
                info!(path = %listener.path().display(), "listening");
                Ok(Listener::Unix(listener))
            }
            #[cfg(not(unix))]
            Connection::Unix => Err(transport_error(
                "bind failed",
                TransportError::Unsupported("unix".into()),
            )),
            Connection::Serial => Err(transport_error(
                "serve failed",
                TransportError::Unsupported("serial".into()),
            )),
        }
    }

    fn accept(&self) -> CliResult<Stream> {
        let stream = match self {
            Listener::Tcp(listener) => listener.accept(),
            #[cfg(unix)]
            Listener::Unix(listener) => listener.accept(),
        };
        stream.map_err(|err| transport_error("accept failed", err))
    }
}

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let read_timeout = args
        .read_timeout
        .as_deref()
        .map(parse_duration)
        .transpose()?;
    let config = WireConfig {
        max_payload_size: args.max_payload,
        read_timeout,
        ..WireConfig::default()
    };

    // The daemon changes directory to `/`, so pin the plugin directory first.
    let plugin_dir = if args.daemon {
        args.plugin_dir
            .canonicalize()
            .unwrap_or_else(|_| args.plugin_dir.clone())
    } else {
        args.plugin_dir.clone()
    };
    let loader = ChainLoader::standard(LoaderConfig {
        plugin_dir,
        ..LoaderConfig::default()
    });
    let mut dispatcher = Dispatcher::new(ProviderRegistry::new(loader));
    for name in &args.preload {
        dispatcher
            .registry_mut()
            .load(name)
            .map_err(|err| plugin_error(&format!("preload of {name} failed"), err))?;
    }

    let listener = Listener::bind(&args)?;

    #[cfg(unix)]
    if args.daemon {
        crate::daemon::detach()?;
    }
    #[cfg(not(unix))]
    if args.daemon {
        warn!("--daemon is only supported on unix; staying in the foreground");
    }

    let running = Arc::new(AtomicBool::new(true));
    let active: Arc<Mutex<Option<Stream>>> = Arc::new(Mutex::new(None));
    install_ctrlc_handler(running.clone(), active.clone())?;

    let stream = listener.accept()?;
    if let Ok(mut slot) = active.lock() {
        *slot = Some(
            stream
                .try_clone()
                .map_err(|err| transport_error("clone failed", err))?,
        );
    }

    let served = serve_stream(&mut dispatcher, stream, config, &running);
    if let Ok(mut slot) = active.lock() {
        slot.take();
    }

    let handled = dispatcher.handled();
    let mut registry = dispatcher.into_registry();
    registry.unload_all();

    match served {
        Ok(()) => {
            info!(requests = handled, "connection closed");
            Ok(SUCCESS)
        }
        Err(err) if !running.load(Ordering::SeqCst) => {
            info!(requests = handled, error = %err, "interrupted");
            Ok(SUCCESS)
        }
        Err(err) => Err(session_error("serve failed", err)),
    }
}

fn install_ctrlc_handler(
    running: Arc<AtomicBool>,
    active: Arc<Mutex<Option<Stream>>>,
) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
        let shutdown = active
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(Stream::shutdown));
        match shutdown {
            Some(Ok(())) => {}
            Some(Err(err)) => warn!(error = %err, "shutdown of active connection failed"),
            None => std::process::exit(SUCCESS),
        }
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
