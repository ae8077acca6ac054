/*
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2024, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

use {
    crate::context::{self, Dmsg, Subsystem},
    core::fmt,
};

pub type RuntimeResult<T> = Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
/// The five failure kinds distinguished by the core, plus collaborator/config failures
pub enum ErrorKind {
    /// a lock could not be acquired before its timeout while processing a sync candidate
    LockTimeout,
    /// a database, table or file vanished from the schema catalog mid-checkpoint
    MissingSchemaObject,
    /// a checkpoint or sync step was cancelled while in progress
    Cancelled,
    /// a checkpoint log record failed to decode; the log is corrupted
    LogCorrupted,
    /// a synchronous checkpoint was requested while one was already running
    RunningCheckpointProcessing,
    /// an external collaborator (buffer pool, schema catalog, transaction manager, log file) failed
    Collaborator(String),
    /// the configuration file failed to parse or validate
    Config(String),
    /// a foreign (non-native) error was wrapped while crossing into this crate
    Foreign(String),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LockTimeout => write!(f, "timed out waiting for a lock"),
            Self::MissingSchemaObject => write!(f, "schema object no longer exists"),
            Self::Cancelled => write!(f, "operation was cancelled"),
            Self::LogCorrupted => write!(f, "checkpoint log is corrupted"),
            Self::RunningCheckpointProcessing => {
                write!(f, "a checkpoint is already running")
            }
            Self::Collaborator(s) => write!(f, "collaborator error: {s}"),
            Self::Config(s) => write!(f, "bad configuration: {s}"),
            Self::Foreign(s) => write!(f, "foreign error: {s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// An error with context tracing: the kind, the subsystem it originated in, and an optional
/// human-readable diagnostic message
pub struct Error {
    kind: ErrorKind,
    origin: Option<Subsystem>,
    dmsg: Option<Dmsg>,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
    pub fn origin(&self) -> Option<Subsystem> {
        self.origin
    }
    pub fn new(kind: ErrorKind, origin: Subsystem, dmsg: impl Into<Dmsg>) -> Self {
        Self {
            kind,
            origin: Some(origin),
            dmsg: Some(dmsg.into()),
        }
    }
    pub fn with_kind(kind: ErrorKind) -> Self {
        Self {
            kind,
            origin: None,
            dmsg: None,
        }
    }
    /// attach (or replace) the origin, inheriting local thread context for the dmsg if unset
    pub fn add_origin(mut self, origin: Subsystem) -> Self {
        self.origin = Some(origin);
        self
    }
    pub fn add_dmsg(mut self, dmsg: impl Into<Dmsg>) -> Self {
        self.dmsg = Some(dmsg.into());
        self
    }
    /// construct an error that inherits whatever origin/dmsg is set in the thread-local context
    pub fn from_kind_inherit(kind: ErrorKind) -> Self {
        Self {
            kind,
            origin: context::pop_origin(),
            dmsg: context::pop_dmsg(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            Some(orig) => write!(f, "{}: ", orig.as_str())?,
            None => write!(f, "runtime error: ")?,
        }
        if let Some(dmsg) = self.dmsg.as_ref() {
            write!(f, "{dmsg}; ")?;
        }
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::from_kind_inherit(kind)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::from_kind_inherit(ErrorKind::Foreign(e.to_string()))
    }
}

/// Extension trait used to attach subsystem/diagnostic context to a [`Result`] at the point
/// an error crosses into this crate, without discarding the underlying cause
pub trait ErrorContext<T> {
    fn set_ctx(self, origin: Subsystem, dmsg: impl Into<Dmsg>) -> RuntimeResult<T>;
    fn set_dmsg(self, dmsg: impl Into<Dmsg>) -> RuntimeResult<T>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: Into<Error>,
{
    fn set_ctx(self, origin: Subsystem, dmsg: impl Into<Dmsg>) -> RuntimeResult<T> {
        self.map_err(|e| e.into().add_origin(origin).add_dmsg(dmsg))
    }
    fn set_dmsg(self, dmsg: impl Into<Dmsg>) -> RuntimeResult<T> {
        self.map_err(|e| e.into().add_dmsg(dmsg))
    }
}
