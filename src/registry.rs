//! On-disk class registry reader (§4.R).
//!
//! Three subspaces, each a flat directory keyed by the 38-character textual
//! form of a class id: in-proc servers (path to the real implementation),
//! in-proc handlers (path to a handler implementation), and treat-as
//! (redirect to another class id).

use crate::config::RuntimeConfig;
use crate::error::Error;
use crate::guid::Guid;
use std::io;
use std::path::PathBuf;

/// Which of the three registry subspaces an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subspace {
    InprocServers,
    InprocHandlers,
    TreatAs,
}

pub struct Registry<'a> {
    config: &'a RuntimeConfig,
}

impl<'a> Registry<'a> {
    pub fn new(config: &'a RuntimeConfig) -> Self {
        Registry { config }
    }

    fn subspace_dir(&self, subspace: Subspace) -> PathBuf {
        let name = match subspace {
            Subspace::InprocServers => &self.config.inproc_servers_dir,
            Subspace::InprocHandlers => &self.config.inproc_handlers_dir,
            Subspace::TreatAs => &self.config.treat_as_dir,
        };
        self.config.registry_root.join(name)
    }

    fn entry_path(&self, subspace: Subspace, class_id: &Guid) -> PathBuf {
        self.subspace_dir(subspace).join(class_id.format())
    }

    /// Reads a class-id entry, returning its contents trimmed of trailing
    /// whitespace.
    ///
    /// Per §9, this reads the whole file rather than a fixed byte count —
    /// the original's fixed `MAX_GUIDSTRING_LEN`-byte read is documented as
    /// a bug for path entries, which may be longer.
    pub fn read(&self, subspace: Subspace, class_id: &Guid) -> Result<String, Error> {
        let path = self.entry_path(subspace, class_id);
        let bytes = std::fs::read(&path).map_err(|e| classify_read_error(e))?;
        let text = String::from_utf8(bytes)?;
        Ok(text.trim_end().to_string())
    }

    /// Writes a treat-as entry mapping `class_id` to `target`. The sole
    /// mutation the core supports (§4.R).
    pub fn write_treat_as(&self, class_id: &Guid, target: &Guid) -> Result<(), Error> {
        let dir = self.subspace_dir(Subspace::TreatAs);
        std::fs::create_dir_all(&dir).map_err(Error::RegistryWrite)?;
        let path = dir.join(class_id.format());
        std::fs::write(&path, target.format()).map_err(Error::RegistryWrite)
    }

    /// Deletes a treat-as entry by writing the null class-id, per `spec.md`
    /// §4.R (the original C implementation instead `unlink()`s the file;
    /// this crate follows the spec's explicit text — see DESIGN.md).
    pub fn delete_treat_as(&self, class_id: &Guid) -> Result<(), Error> {
        self.write_treat_as(class_id, &Guid::CLSID_NULL)
    }

    /// Looks up a path-bearing entry (in-proc server or in-proc handler).
    pub fn resolve_library_path(&self, subspace: Subspace, class_id: &Guid) -> Result<PathBuf, Error> {
        let text = self.read(subspace, class_id)?;
        Ok(PathBuf::from(text))
    }
}

fn classify_read_error(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::PermissionDenied => Error::RegistryPermissionDenied(e),
        io::ErrorKind::NotFound => Error::RegistryEntryNotFound,
        _ => Error::RegistryRead(e),
    }
}
