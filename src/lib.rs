//! `gcom-rt`: an in-process component activation and lifetime runtime,
//! modeled on a minimal COM 0.9-style object model (§1).
//!
//! The crate is organized around the modules named in the specification:
//! [`guid`] (identifiers), [`error`] (the result-code ABI and internal error
//! type), [`list`] (the intrusive list every other module builds on),
//! [`alloc`] (the process task allocator), [`registry`] (the on-disk class
//! registry), [`emulation`] (treat-as resolution), [`library`] (dynamic
//! library loading), [`interface`] (the `IUnknown`/class-factory contracts),
//! [`activator`] (class activation) and [`lifecycle`] (process init/teardown).

pub mod activator;
pub mod alloc;
pub mod config;
pub mod context;
pub mod emulation;
pub mod error;
pub mod guid;
pub mod interface;
pub mod library;
pub mod lifecycle;
pub mod list;
pub mod registry;

pub use activator::Activator;
pub use config::RuntimeConfig;
pub use context::ClsCtx;
pub use error::{Error, HResult};
pub use guid::Guid;
pub use interface::{ClassFactory, ComPtr, FactoryCounters, Unknown};
pub use library::{LibraryHandle, LibraryManager};
pub use registry::{Registry, Subspace};
