/// Aurora Engine - Singleton manager for the render layer
///
/// This module owns the global RenderCommand facade and the global logger.
/// It uses thread-safe static storage with RwLock for safe concurrent access.

use std::sync::{OnceLock, RwLock, Arc, Mutex};
use std::time::SystemTime;
use crate::render::render_command::RenderCommand;
use crate::error::{Result, Error};
use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};

// ===== INTERNAL STATE =====

/// Global engine state storage
static ENGINE_STATE: OnceLock<EngineState> = OnceLock::new();

/// Global logger (initialized with DefaultLogger)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

/// Internal state structure holding all engine singletons
struct EngineState {
    /// RenderCommand singleton (wrapped in Mutex for thread-safe mutable access)
    render_command: RwLock<Option<Arc<Mutex<RenderCommand>>>>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            render_command: RwLock::new(None),
        }
    }
}

// ===== PUBLIC API =====

/// Main engine singleton manager
///
/// Holds the process-wide RenderCommand so that any subsystem can reach the
/// active backend without threading a handle through every call.
///
/// # Example
///
/// ```no_run
/// use aurora_render::aurora::Engine;
/// use aurora_render::aurora::render::{BackendRegistry, Config, RenderApi, RenderCommand};
///
/// Engine::initialize()?;
///
/// let registry = BackendRegistry::new();
/// // aurora_render_opengl::register(&mut registry, ...);
/// let mut command = RenderCommand::new(Config::default(), registry, 1280, 720);
/// command.initialize(RenderApi::OpenGl)?;
/// Engine::create_render_command(command)?;
///
/// let command = Engine::render_command()?;
/// command.lock().unwrap().clear()?;
///
/// Engine::shutdown();
/// # Ok::<(), aurora_render::aurora::Error>(())
/// ```
pub struct Engine;

impl Engine {
    /// Log errors before returning them (internal use)
    fn log_and_return_error(error: Error) -> Error {
        match &error {
            Error::InitializationFailed(msg) => {
                crate::engine_error!("aurora::Engine", "Initialization failed: {}", msg);
            }
            Error::BackendError(msg) => {
                crate::engine_error!("aurora::Engine", "Backend error: {}", msg);
            }
            _ => {
                crate::engine_error!("aurora::Engine", "Engine error: {}", error);
            }
        }
        error
    }

    fn state() -> Result<&'static EngineState> {
        ENGINE_STATE.get()
            .ok_or_else(|| Self::log_and_return_error(
                Error::InitializationFailed("Engine not initialized. Call Engine::initialize() first.".to_string())
            ))
    }

    /// Initialize the engine
    ///
    /// Idempotent. Must be called before `create_render_command`.
    pub fn initialize() -> Result<()> {
        ENGINE_STATE.get_or_init(EngineState::new);
        Ok(())
    }

    /// Destroy every singleton
    ///
    /// Dropping the last RenderCommand handle waits for the GPU and releases
    /// the backend. Call `initialize()` again before creating a new facade.
    pub fn shutdown() {
        if let Some(state) = ENGINE_STATE.get() {
            if let Ok(mut command) = state.render_command.write() {
                *command = None;
            }
        }
    }

    // ===== RENDER COMMAND API =====

    /// Register `command` as the global RenderCommand
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The engine is not initialized
    /// - A RenderCommand already exists
    /// - The lock is poisoned
    pub fn create_render_command(command: RenderCommand) -> Result<()> {
        let state = Self::state()?;

        let mut lock = state.render_command.write()
            .map_err(|_| Self::log_and_return_error(
                Error::BackendError("RenderCommand lock poisoned".to_string())
            ))?;

        if lock.is_some() {
            return Err(Self::log_and_return_error(
                Error::InitializationFailed("RenderCommand already exists. Call Engine::destroy_render_command() first.".to_string())
            ));
        }

        let api = command.active_api();
        *lock = Some(Arc::new(Mutex::new(command)));

        match api {
            Some(api) => crate::engine_info!("aurora::Engine", "RenderCommand singleton created ({})", api),
            None => crate::engine_info!("aurora::Engine", "RenderCommand singleton created (no backend yet)"),
        }

        Ok(())
    }

    /// Get the global RenderCommand
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is not initialized or the RenderCommand
    /// has not been created.
    pub fn render_command() -> Result<Arc<Mutex<RenderCommand>>> {
        let state = Self::state()?;

        let lock = state.render_command.read()
            .map_err(|_| Self::log_and_return_error(
                Error::BackendError("RenderCommand lock poisoned".to_string())
            ))?;

        lock.clone()
            .ok_or_else(|| Self::log_and_return_error(
                Error::InitializationFailed("RenderCommand not created. Call Engine::create_render_command() first.".to_string())
            ))
    }

    /// Destroy the global RenderCommand
    ///
    /// Existing handles stay valid until dropped.
    pub fn destroy_render_command() -> Result<()> {
        let state = Self::state()?;

        let mut lock = state.render_command.write()
            .map_err(|_| Self::log_and_return_error(
                Error::BackendError("RenderCommand lock poisoned".to_string())
            ))?;

        *lock = None;

        crate::engine_info!("aurora::Engine", "RenderCommand singleton destroyed");

        Ok(())
    }

    /// Reset all singletons for testing (only available in test builds)
    #[cfg(test)]
    pub fn reset_for_testing() {
        if let Some(state) = ENGINE_STATE.get() {
            if let Ok(mut command) = state.render_command.write() {
                *command = None;
            }
        }
    }

    // ===== LOGGING API =====

    /// Set a custom logger
    ///
    /// Replace the default logger with a custom implementation (file logger,
    /// editor console, test capture, etc.)
    ///
    /// # Example
    ///
    /// ```no_run
    /// use aurora_render::aurora::{Engine, log::{Logger, LogEntry}};
    ///
    /// struct FileLogger;
    /// impl Logger for FileLogger {
    ///     fn log(&self, entry: &LogEntry) {
    ///         // Write to file...
    ///     }
    /// }
    ///
    /// Engine::set_logger(FileLogger);
    /// ```
    pub fn set_logger<L: Logger + 'static>(logger: L) {
        let logger_lock = LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)));
        if let Ok(mut lock) = logger_lock.write() {
            *lock = Box::new(logger);
        }
    }

    /// Reset logger to default (DefaultLogger)
    pub fn reset_logger() {
        let logger_lock = LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)));
        if let Ok(mut lock) = logger_lock.write() {
            *lock = Box::new(DefaultLogger);
        }
    }

    /// Internal logging method (for simple logs without file:line)
    ///
    /// Used by macros like engine_info!, engine_warn!, etc.
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        let logger_lock = LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)));
        if let Ok(lock) = logger_lock.read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: None,
                line: None,
            });
        }
    }

    /// Internal logging method with file:line information (for ERROR logs)
    ///
    /// Used by engine_error! and engine_err! to include source location.
    pub fn log_detailed(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: &'static str,
        line: u32,
    ) {
        let logger_lock = LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)));
        if let Ok(lock) = logger_lock.read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: Some(file),
                line: Some(line),
            });
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
