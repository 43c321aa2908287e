//! Class activator (§4.F): class id → loaded interface pointer.

use crate::config::RuntimeConfig;
use crate::context::ClsCtx;
use crate::emulation;
use crate::error::Error;
use crate::guid::Guid;
use crate::interface::{ClassFactoryVtbl, ComPtr, RawObject, UnknownVtbl};
use crate::library::LibraryManager;
use crate::registry::{Registry, Subspace};
use std::ffi::c_void;
use std::ptr::NonNull;

pub struct Activator<'a> {
    config: &'a RuntimeConfig,
    library_manager: &'a LibraryManager<'a>,
}

impl<'a> Activator<'a> {
    pub fn new(config: &'a RuntimeConfig, library_manager: &'a LibraryManager<'a>) -> Self {
        Activator { config, library_manager }
    }

    /// Resolves `class_id` through the emulation resolver, then tries each
    /// requested location in order (in-proc server, in-proc handler; local
    /// and remote are unsupported and silently skipped); first success wins
    /// (§4.F).
    pub fn get_class_object(
        &self,
        class_id: &Guid,
        ctx: ClsCtx,
        interface_id: &Guid,
    ) -> Result<ComPtr<UnknownVtbl>, Error> {
        let registry = Registry::new(self.config);
        let resolved = emulation::resolve(&registry, class_id);

        let locations = [
            (ClsCtx::INPROC_SERVER, Subspace::InprocServers),
            (ClsCtx::INPROC_HANDLER, Subspace::InprocHandlers),
        ];

        for (bit, subspace) in locations {
            if !ctx.contains(bit) {
                continue;
            }
            match self.try_location(&registry, subspace, &resolved, class_id, interface_id) {
                Ok(ptr) => return Ok(ptr),
                Err(e) => log::debug!("activation attempt failed for one location: {e}"),
            }
        }
        // Every intermediate failure is discarded: on total failure this
        // always collapses to class-not-registered (§4.F), matching the
        // original's `CoGetClassObject`, which hardcodes `E_CLASSNOTREG`
        // regardless of which underlying lookup failed.
        Err(Error::ClassNotRegistered(*class_id))
    }

    fn try_location(
        &self,
        registry: &Registry<'_>,
        subspace: Subspace,
        resolved_class_id: &Guid,
        original_class_id: &Guid,
        interface_id: &Guid,
    ) -> Result<ComPtr<UnknownVtbl>, Error> {
        let path = registry.resolve_library_path(subspace, resolved_class_id)?;
        let path_str = path.to_str().ok_or(Error::InvalidArgument)?;
        let handle = self.library_manager.load(path_str)?;

        // The original (un-resolved) class id is what gets passed to the
        // library's own DllGetClassObject (§4.F).
        let raw = self
            .library_manager
            .get_class_object(handle, original_class_id, interface_id)?;
        let raw = NonNull::new(raw as *mut RawObject<UnknownVtbl>).ok_or(Error::NoInterface)?;
        Ok(unsafe { ComPtr::from_raw(raw) })
    }

    /// Convenience wrapper over `get_class_object` + `CreateInstance` +
    /// releasing the factory (§4.F). Aggregation is unsupported: a non-null
    /// `outer` is rejected with [`Error::NoAggregation`] before even asking
    /// the factory (the factory itself also enforces this, per §4.I, but
    /// checking here avoids loading a library needlessly).
    pub fn create_instance(
        &self,
        class_id: &Guid,
        outer: Option<NonNull<c_void>>,
        ctx: ClsCtx,
        interface_id: &Guid,
    ) -> Result<ComPtr<UnknownVtbl>, Error> {
        if outer.is_some() {
            return Err(Error::NoAggregation);
        }

        let factory = self
            .get_class_object(class_id, ctx, &Guid::IID_CLASS_FACTORY)?
            .cast::<ClassFactoryVtbl>();

        let create_instance = factory.vtbl().create_instance;
        let mut out: *mut c_void = std::ptr::null_mut();
        let hr = unsafe {
            create_instance(
                factory.as_ptr().as_ptr() as *mut c_void,
                std::ptr::null_mut(),
                interface_id,
                &mut out,
            )
        };
        // `factory` is dropped here, releasing the one factory reference
        // taken by `get_class_object`.
        drop(factory);

        if hr & 0x8000_0000 != 0 {
            return Err(Error::NoInterface);
        }
        let raw = NonNull::new(out as *mut RawObject<UnknownVtbl>).ok_or(Error::NoInterface)?;
        Ok(unsafe { ComPtr::from_raw(raw) })
    }

    /// Creates one object via the unknown interface, then queries each of
    /// `interface_ids` on it, recording a result per entry (§4.F). The
    /// object receives one additional reference per successful query; the
    /// single unknown reference taken during creation is released
    /// regardless of outcome.
    pub fn create_instance_ex(
        &self,
        class_id: &Guid,
        outer: Option<NonNull<c_void>>,
        ctx: ClsCtx,
        interface_ids: &[Guid],
    ) -> (Result<(), Error>, Vec<(Guid, Result<ComPtr<UnknownVtbl>, Error>)>) {
        if outer.is_some() {
            return (
                Err(Error::NoAggregation),
                interface_ids
                    .iter()
                    .map(|iid| (*iid, Err(Error::NoAggregation)))
                    .collect(),
            );
        }

        let unknown = match self.create_instance(class_id, None, ctx, &Guid::IID_UNKNOWN) {
            Ok(u) => u,
            Err(e) => {
                let per_interface = interface_ids
                    .iter()
                    .map(|iid| (*iid, Err(e.clone_like())))
                    .collect();
                return (Err(e), per_interface);
            }
        };

        // Per §9, `successfulQueries` starts at zero (the original leaves
        // it uninitialized before the accumulation loop).
        let mut successful_queries = 0usize;
        let mut results = Vec::with_capacity(interface_ids.len());

        for iid in interface_ids {
            let query_interface = unknown.vtbl().query_interface;
            let mut out: *mut c_void = std::ptr::null_mut();
            let hr = unsafe {
                query_interface(
                    unknown.as_ptr().as_ptr() as *mut c_void,
                    iid,
                    &mut out,
                )
            };
            if hr & 0x8000_0000 == 0 {
                if let Some(raw) = NonNull::new(out as *mut RawObject<UnknownVtbl>) {
                    successful_queries += 1;
                    results.push((*iid, Ok(unsafe { ComPtr::from_raw(raw) })));
                    continue;
                }
            }
            results.push((*iid, Err(Error::NoInterface)));
        }

        // `unknown` is dropped here, releasing the single reference taken
        // during creation (§4.F).
        drop(unknown);

        let overall = if successful_queries == 0 {
            Err(Error::NoInterface)
        } else if successful_queries < interface_ids.len() {
            Err(Error::NotAllInterfaces)
        } else {
            Ok(())
        };

        (overall, results)
    }
}

impl Error {
    /// `Error` does not derive `Clone` (some variants wrap non-`Clone`
    /// sources); this produces an equivalent variant for the few call sites
    /// that need to report the same failure against every element of a
    /// batch.
    fn clone_like(&self) -> Error {
        match self {
            Error::ClassNotRegistered(g) => Error::ClassNotRegistered(*g),
            Error::RegistryEntryNotFound => Error::RegistryEntryNotFound,
            Error::LibraryNotFound { path, .. } => Error::LibraryNotFound {
                path: path.clone(),
                source: None,
            },
            Error::SymbolNotFound(s) => Error::SymbolNotFound(s.clone()),
            Error::NoInterface => Error::NoInterface,
            Error::NoAggregation => Error::NoAggregation,
            Error::OutOfMemory => Error::OutOfMemory,
            Error::InvalidArgument => Error::InvalidArgument,
            Error::NotAllInterfaces => Error::NotAllInterfaces,
            _ => Error::Unexpected,
        }
    }
}
