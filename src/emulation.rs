//! Treat-as emulation resolver (§4.E).

use crate::guid::Guid;
use crate::registry::{Registry, Subspace};

/// Chases the treat-as mapping to a fixed point, in the order §4.E
/// documents:
/// 1. lookup fails → return the current class id;
/// 2. lookup returns the current class id (self-map) → return it;
/// 3. lookup returns the original input (cycle back to start) → return the
///    current class id, breaking the cycle without error;
/// 4. otherwise advance and continue.
///
/// Always succeeds; only the full cycle-back-to-origin is detected, not
/// arbitrary intermediate cycles (§4.E, §9).
pub fn resolve(registry: &Registry<'_>, class_id: &Guid) -> Guid {
    let original = *class_id;
    let mut current = *class_id;

    loop {
        let mapped = match registry.read(Subspace::TreatAs, &current) {
            Ok(text) => match Guid::parse(&text) {
                Ok(g) => g,
                Err(_) => return current,
            },
            Err(_) => return current,
        };

        if mapped == Guid::CLSID_NULL {
            // A deleted treat-as entry (§4.R) is equivalent to no mapping.
            return current;
        }
        if mapped == current {
            return current;
        }
        if mapped == original {
            return current;
        }
        current = mapped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use tempfile::tempdir;

    fn guid(n: u32) -> Guid {
        Guid::new(n, 0, 0, [0; 8])
    }

    #[test]
    fn no_entry_resolves_to_itself() {
        let dir = tempdir().unwrap();
        let cfg = RuntimeConfig::with_registry_root(dir.path());
        let reg = Registry::new(&cfg);
        let a = guid(1);
        assert_eq!(resolve(&reg, &a), a);
    }

    #[test]
    fn direct_redirect_resolves_to_the_target() {
        let dir = tempdir().unwrap();
        let cfg = RuntimeConfig::with_registry_root(dir.path());
        let reg = Registry::new(&cfg);
        let a = guid(1);
        let b = guid(2);
        reg.write_treat_as(&a, &b).unwrap();
        assert_eq!(resolve(&reg, &a), b);
    }

    #[test]
    fn cycle_back_to_origin_terminates() {
        let dir = tempdir().unwrap();
        let cfg = RuntimeConfig::with_registry_root(dir.path());
        let reg = Registry::new(&cfg);
        let a = guid(1);
        let b = guid(2);
        let c = guid(3);
        reg.write_treat_as(&a, &b).unwrap();
        reg.write_treat_as(&b, &c).unwrap();
        reg.write_treat_as(&c, &a).unwrap();

        let result = resolve(&reg, &a);
        assert!(result == a || result == b || result == c);
    }

    #[test]
    fn self_map_resolves_to_itself() {
        let dir = tempdir().unwrap();
        let cfg = RuntimeConfig::with_registry_root(dir.path());
        let reg = Registry::new(&cfg);
        let a = guid(1);
        reg.write_treat_as(&a, &a).unwrap();
        assert_eq!(resolve(&reg, &a), a);
    }

    #[test]
    fn deleted_treat_as_entry_is_equivalent_to_no_mapping() {
        let dir = tempdir().unwrap();
        let cfg = RuntimeConfig::with_registry_root(dir.path());
        let reg = Registry::new(&cfg);
        let a = guid(1);
        reg.write_treat_as(&a, &guid(2)).unwrap();
        reg.delete_treat_as(&a).unwrap();
        assert_eq!(resolve(&reg, &a), a);
    }
}
