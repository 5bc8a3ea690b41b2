// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Engine binding lifecycle.
//!
//! A device moves through three states:
//!
//! ```text
//!  Unregistered --register--> Registered --try_open--> Bound
//!       ^                        |   ^                   |
//!       +-------unregister-------+   +-----try_close-----+
//! ```
//!
//! The node open flag travels with the unbound states; a bound device always
//! has its node open. Opening and closing are idempotent: a second open or
//! close never reaches the engine.

use crate::{
    engine::{Engine, InstanceId, RegistrationId},
    format::{Direction, MediaType},
    Error,
};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// The engine has not registered this device yet.
    Unregistered { node_open: bool },
    /// Registered, no engine instance open.
    Registered {
        registration: RegistrationId,
        node_open: bool,
    },
    /// An engine instance is open for `direction`.
    Bound {
        registration: RegistrationId,
        instance: InstanceId,
        direction: Direction,
    },
}

impl Lifecycle {
    pub fn is_node_open(&self) -> bool {
        match *self {
            Lifecycle::Unregistered { node_open } => node_open,
            Lifecycle::Registered { node_open, .. } => node_open,
            Lifecycle::Bound { .. } => true,
        }
    }

    pub fn registration(&self) -> Option<RegistrationId> {
        match *self {
            Lifecycle::Unregistered { .. } => None,
            Lifecycle::Registered { registration, .. } => Some(registration),
            Lifecycle::Bound { registration, .. } => Some(registration),
        }
    }

    pub fn instance(&self) -> Option<InstanceId> {
        match *self {
            Lifecycle::Bound { instance, .. } => Some(instance),
            _ => None,
        }
    }

    fn with_node_open(self, open: bool) -> Self {
        match self {
            Lifecycle::Unregistered { .. } => Lifecycle::Unregistered { node_open: open },
            Lifecycle::Registered { registration, .. } => Lifecycle::Registered {
                registration,
                node_open: open,
            },
            bound => bound,
        }
    }
}

/// The engine side of one device.
pub struct EngineBinding {
    engine: Arc<dyn Engine>,
    media: MediaType,
    state: Lifecycle,
}

impl EngineBinding {
    pub fn new(engine: Arc<dyn Engine>, media: MediaType) -> Self {
        EngineBinding {
            engine,
            media,
            state: Lifecycle::Unregistered { node_open: false },
        }
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn media(&self) -> MediaType {
        self.media
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn instance(&self) -> Option<InstanceId> {
        self.state.instance()
    }

    pub fn is_node_open(&self) -> bool {
        self.state.is_node_open()
    }

    /// Register the device with the engine; a registered device is left as-is.
    pub fn register(&mut self, name: &str, device_node: &str) -> Result<(), Error> {
        if let Lifecycle::Unregistered { node_open } = self.state {
            let registration = self
                .engine
                .register_adapter_media(self.media, name, device_node)
                .map_err(|err| {
                    log::error!("failed to register {} with the engine: {}", name, err);
                    err
                })?;
            log::info!("registered {} ({}) as {}", name, self.media, registration);
            self.state = Lifecycle::Registered {
                registration,
                node_open,
            };
        }
        Ok(())
    }

    /// Unregister from the engine, closing a bound instance first.
    ///
    /// Failures are logged; the device is considered unregistered afterwards.
    pub fn unregister(&mut self) {
        if self.state.instance().is_some() {
            if let Err(err) = self.try_close() {
                log::error!("failed to close instance before unregistering: {}", err);
            }
        }

        let node_open = self.state.is_node_open();
        match self.state.registration() {
            None => log::info!("{} device is not registered", self.media),
            Some(registration) => {
                if let Err(err) = self.engine.unregister_adapter_media(registration) {
                    log::error!("failed to unregister {}: {}", registration, err);
                }
            }
        }
        self.state = Lifecycle::Unregistered { node_open };
    }

    /// Mark the device node open.
    pub fn open_node(&mut self) -> Result<(), Error> {
        if self.state.is_node_open() {
            return Err(Error::PermissionDenied("device is already open"));
        }
        self.state = self.state.with_node_open(true);
        Ok(())
    }

    /// Close a bound instance and mark the node released.
    ///
    /// When the close fails the node stays open and bound.
    pub fn release_node(&mut self) -> Result<(), Error> {
        if !self.state.is_node_open() {
            return Err(Error::PermissionDenied("device is not open"));
        }
        self.try_close()?;
        self.state = self.state.with_node_open(false);
        Ok(())
    }

    /// Open an engine instance for `direction` unless one is already bound.
    ///
    /// Succeeds without opening anything while the device is unregistered.
    pub fn try_open(&mut self, direction: Direction) -> Result<(), Error> {
        match self.state {
            Lifecycle::Bound {
                instance,
                direction: bound,
                ..
            } => {
                if bound != direction {
                    log::debug!(
                        "instance {} already open for {}, sharing with {}",
                        instance,
                        bound,
                        direction
                    );
                }
                Ok(())
            }
            Lifecycle::Unregistered { .. } => {
                log::info!("{} device not registered yet, engine open deferred", self.media);
                Ok(())
            }
            Lifecycle::Registered { registration, .. } => {
                let instance = self.engine.open(registration, direction).map_err(|err| {
                    log::error!("failed to open engine for {}: {}", direction, err);
                    err
                })?;
                log::debug!("opened instance {} for {}", instance, direction);
                self.state = Lifecycle::Bound {
                    registration,
                    instance,
                    direction,
                };
                Ok(())
            }
        }
    }

    /// Close the bound instance; without one this does nothing.
    pub fn try_close(&mut self) -> Result<(), Error> {
        let Lifecycle::Bound {
            registration,
            instance,
            ..
        } = self.state
        else {
            log::debug!("{} device has no open instance", self.media);
            return Ok(());
        };

        self.engine.close(instance).map_err(|err| {
            log::error!("failed to close instance {}: {}", instance, err);
            err
        })?;
        self.state = Lifecycle::Registered {
            registration,
            node_open: true,
        };
        Ok(())
    }
}
