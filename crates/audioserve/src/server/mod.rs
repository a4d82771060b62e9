//! Real-time server core
//!
//! Every backend runs through the same [`RealtimeServer`] skeleton:
//!
//! ```text
//! run() ─► begin ─► open ─► configure client ─► activate ─► backend loop
//!            │        │            │                             │
//!            │        └─ error ────┴─► close, client shutdown ───┤
//!            ▼                        Terminated, Err returned   ▼
//!     AlreadyStarted              request shutdown, close, client shutdown,
//!                                 Terminated, Ok(())
//! ```
//!
//! The backend supplies resource handling and the per-cycle work through
//! [`ServerBackend`]. Other threads observe and stop the server through a
//! cloned [`ServerController`].

pub mod lifecycle;

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use crate::client::ClientError;
use crate::config::AudioConfiguration;
use crate::error::{ServerError, ServerResult};

pub use lifecycle::{Lifecycle, State};

/// A server driving one client on the calling thread
pub trait AudioServer: Send {
    /// Execute the full lifecycle on the calling thread
    ///
    /// Returns once the server has terminated. Setup failures are returned
    /// as errors; failures while processing end the run and are logged.
    fn run(&mut self) -> ServerResult<()>;

    /// The negotiated configuration once set up, otherwise the requested one
    fn configuration(&self) -> AudioConfiguration;

    /// True while the server owns resources (`Active` or `Closing`)
    fn is_active(&self) -> bool;

    /// Request shutdown; returns immediately
    fn shutdown(&self);

    /// Handle for observing and stopping the server from another thread
    fn controller(&self) -> ServerController;
}

struct Shared {
    lifecycle: Lifecycle,
    requested: AudioConfiguration,
    actual: OnceLock<AudioConfiguration>,
}

/// Thread-safe handle onto a running server
#[derive(Clone)]
pub struct ServerController {
    shared: Arc<Shared>,
}

impl ServerController {
    pub fn new(requested: AudioConfiguration) -> Self {
        Self {
            shared: Arc::new(Shared {
                lifecycle: Lifecycle::new(),
                requested,
                actual: OnceLock::new(),
            }),
        }
    }

    pub fn state(&self) -> State {
        self.shared.lifecycle.get()
    }

    pub fn is_active(&self) -> bool {
        self.shared.lifecycle.is_active()
    }

    /// True while the processing loop should keep running
    pub fn is_running(&self) -> bool {
        self.shared.lifecycle.is_running()
    }

    /// Ask the server to stop (idempotent)
    pub fn request_shutdown(&self) {
        self.shared.lifecycle.request_shutdown();
    }

    /// The negotiated configuration, falling back to the requested one
    pub fn configuration(&self) -> AudioConfiguration {
        self.shared
            .actual
            .get()
            .unwrap_or(&self.shared.requested)
            .clone()
    }

    pub fn requested_configuration(&self) -> &AudioConfiguration {
        &self.shared.requested
    }

    pub(crate) fn lifecycle(&self) -> &Lifecycle {
        &self.shared.lifecycle
    }

    fn publish(&self, actual: &AudioConfiguration) {
        let _ = self.shared.actual.set(actual.clone());
    }
}

impl std::fmt::Debug for ServerController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerController")
            .field("state", &self.state())
            .finish()
    }
}

/// Backend-specific half of a server
///
/// A backend owns the client. Resources acquired by `open` live in the
/// `Session`, which never leaves the thread calling `run`, so it may hold
/// non-`Send` handles.
pub trait ServerBackend: Send {
    type Session;

    /// Acquire resources sized for `requested`
    ///
    /// Returns the session and the actual configuration, which may differ
    /// from the request and may carry backend extensions.
    fn open(
        &mut self,
        requested: &AudioConfiguration,
        controller: &ServerController,
    ) -> ServerResult<(Self::Session, AudioConfiguration)>;

    /// Pass the actual configuration to the client
    fn configure_client(&mut self, config: &AudioConfiguration) -> Result<(), ClientError>;

    /// Process until the controller stops running
    ///
    /// Errors end the run but are not returned to the caller of `run`.
    fn process(
        &mut self,
        session: &mut Self::Session,
        controller: &ServerController,
    ) -> ServerResult<()>;

    /// Release resources; failures are logged, never raised
    fn close(&mut self, session: Self::Session);

    /// Notify the client that no further calls follow
    fn shutdown_client(&mut self);
}

/// Lifecycle skeleton shared by all backends
pub struct RealtimeServer<B: ServerBackend> {
    backend: B,
    controller: ServerController,
}

impl<B: ServerBackend> RealtimeServer<B> {
    pub fn new(requested: AudioConfiguration, backend: B) -> Self {
        Self {
            backend,
            controller: ServerController::new(requested),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Open resources and configure the client
    ///
    /// On failure, everything acquired so far is already released.
    fn initialise(&mut self) -> ServerResult<B::Session> {
        let requested = self.controller.requested_configuration().clone();
        let (session, actual) = self.backend.open(&requested, &self.controller)?;
        self.controller.publish(&actual);
        log::debug!("Negotiated {}", actual);

        if let Err(e) = self.backend.configure_client(&actual) {
            log::warn!("Client rejected configuration: {}", e);
            self.backend.close(session);
            return Err(ServerError::ClientRejected(e));
        }
        Ok(session)
    }
}

impl<B: ServerBackend> AudioServer for RealtimeServer<B> {
    fn run(&mut self) -> ServerResult<()> {
        if !self.controller.lifecycle().begin() {
            return Err(ServerError::AlreadyStarted);
        }

        let mut session = match self.initialise() {
            Ok(session) => session,
            Err(e) => {
                self.backend.shutdown_client();
                self.controller.lifecycle().terminate();
                return Err(e);
            }
        };

        if self.controller.lifecycle().activate() {
            log::info!("Audio server active");
            let backend = &mut self.backend;
            let controller = &self.controller;
            let result =
                panic::catch_unwind(AssertUnwindSafe(|| backend.process(&mut session, controller)));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::error!("Audio server stopped: {}", e),
                Err(_) => log::error!("Audio server loop panicked, tearing down"),
            }
        } else {
            log::debug!("Shutdown requested during initialisation");
        }

        self.controller.request_shutdown();
        self.backend.close(session);
        self.backend.shutdown_client();
        self.controller.lifecycle().terminate();
        log::info!("Audio server terminated");
        Ok(())
    }

    fn configuration(&self) -> AudioConfiguration {
        self.controller.configuration()
    }

    fn is_active(&self) -> bool {
        self.controller.is_active()
    }

    fn shutdown(&self) {
        self.controller.request_shutdown();
    }

    fn controller(&self) -> ServerController {
        self.controller.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Calls {
        events: Mutex<Vec<&'static str>>,
    }

    impl Calls {
        fn push(&self, event: &'static str) {
            self.events.lock().unwrap().push(event);
        }

        fn take(&self) -> Vec<&'static str> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    /// Backend recording the skeleton's call order
    struct ScriptedBackend {
        calls: Arc<Calls>,
        fail_open: bool,
        reject: bool,
        panic_in_process: bool,
        cycles: usize,
    }

    impl ScriptedBackend {
        fn new(calls: &Arc<Calls>) -> Self {
            Self {
                calls: Arc::clone(calls),
                fail_open: false,
                reject: false,
                panic_in_process: false,
                cycles: 3,
            }
        }
    }

    impl ServerBackend for ScriptedBackend {
        type Session = ();

        fn open(
            &mut self,
            _requested: &AudioConfiguration,
            _controller: &ServerController,
        ) -> ServerResult<((), AudioConfiguration)> {
            self.calls.push("open");
            if self.fail_open {
                return Err(ServerError::Acquisition("no device".to_string()));
            }
            let actual = AudioConfiguration::new(44100.0, 0, 2, 256, true)?;
            Ok(((), actual))
        }

        fn configure_client(&mut self, config: &AudioConfiguration) -> Result<(), ClientError> {
            self.calls.push("configure");
            assert_eq!(config.sample_rate(), 44100.0);
            if self.reject {
                Err(ClientError::new("nope"))
            } else {
                Ok(())
            }
        }

        fn process(&mut self, _: &mut (), controller: &ServerController) -> ServerResult<()> {
            while controller.is_running() {
                self.calls.push("process");
                if self.panic_in_process {
                    panic!("line failure");
                }
                self.cycles -= 1;
                if self.cycles == 0 {
                    controller.request_shutdown();
                }
            }
            Ok(())
        }

        fn close(&mut self, _: ()) {
            self.calls.push("close");
        }

        fn shutdown_client(&mut self) {
            self.calls.push("shutdown");
        }
    }

    fn requested() -> AudioConfiguration {
        AudioConfiguration::new(48000.0, 0, 2, 512, true).unwrap()
    }

    #[test]
    fn test_successful_run_sequence() {
        let calls = Arc::new(Calls::default());
        let mut server = RealtimeServer::new(requested(), ScriptedBackend::new(&calls));
        let controller = server.controller();
        assert_eq!(controller.state(), State::New);
        assert_eq!(server.configuration().sample_rate(), 48000.0);

        server.run().unwrap();

        assert_eq!(
            calls.take(),
            vec!["open", "configure", "process", "process", "process", "close", "shutdown"]
        );
        assert_eq!(controller.state(), State::Terminated);
        assert!(!server.is_active());
        // Negotiated configuration stays visible after termination
        assert_eq!(server.configuration().sample_rate(), 44100.0);
    }

    #[test]
    fn test_second_run_rejected() {
        let calls = Arc::new(Calls::default());
        let mut server = RealtimeServer::new(requested(), ScriptedBackend::new(&calls));
        server.run().unwrap();
        calls.take();
        assert!(matches!(server.run(), Err(ServerError::AlreadyStarted)));
        assert!(calls.take().is_empty());
    }

    #[test]
    fn test_open_failure_notifies_client_once() {
        let calls = Arc::new(Calls::default());
        let mut backend = ScriptedBackend::new(&calls);
        backend.fail_open = true;
        let mut server = RealtimeServer::new(requested(), backend);

        let err = server.run().unwrap_err();
        assert!(matches!(err, ServerError::Acquisition(_)));
        assert_eq!(calls.take(), vec!["open", "shutdown"]);
        assert_eq!(server.controller().state(), State::Terminated);
    }

    #[test]
    fn test_rejected_configuration_releases_resources() {
        let calls = Arc::new(Calls::default());
        let mut backend = ScriptedBackend::new(&calls);
        backend.reject = true;
        let mut server = RealtimeServer::new(requested(), backend);

        let err = server.run().unwrap_err();
        assert!(matches!(err, ServerError::ClientRejected(_)));
        assert_eq!(calls.take(), vec!["open", "configure", "close", "shutdown"]);
        assert_eq!(server.controller().state(), State::Terminated);
    }

    #[test]
    fn test_panicking_loop_still_tears_down() {
        let calls = Arc::new(Calls::default());
        let mut backend = ScriptedBackend::new(&calls);
        backend.panic_in_process = true;
        let mut server = RealtimeServer::new(requested(), backend);

        server.run().unwrap();
        assert_eq!(
            calls.take(),
            vec!["open", "configure", "process", "close", "shutdown"]
        );
        assert_eq!(server.controller().state(), State::Terminated);
        assert!(!server.is_active());
    }

    #[test]
    fn test_shutdown_before_run_skips_processing() {
        let calls = Arc::new(Calls::default());
        let mut server = RealtimeServer::new(requested(), ScriptedBackend::new(&calls));
        // New -> Closing: run() can no longer begin
        server.shutdown();
        assert!(matches!(server.run(), Err(ServerError::AlreadyStarted)));
        assert!(calls.take().is_empty());
    }

    #[test]
    fn test_configuration_error_converts() {
        let err: ServerError = ConfigError::NoOutputChannels.into();
        assert!(err.to_string().contains("output channel"));
    }
}
