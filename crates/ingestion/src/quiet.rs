//! Scoped suppression of library diagnostics.

use netcdf_parser::Hdf5ErrorGuard;
use tracing::subscriber::{DefaultGuard, NoSubscriber};

/// While alive, tracing events emitted on the current thread are dropped and
/// HDF5 does not print its error stack. Both are restored on drop.
///
/// ```ignore
/// let _quiet = HiddenOutput::new();
/// let reader = ZarrDatasetReader::open(&location)?;
/// ```
pub struct HiddenOutput {
    _tracing: DefaultGuard,
    _hdf5: Hdf5ErrorGuard,
}

impl HiddenOutput {
    pub fn new() -> Self {
        Self {
            _tracing: tracing::subscriber::set_default(NoSubscriber::default()),
            _hdf5: Hdf5ErrorGuard::new(),
        }
    }
}

impl Default for HiddenOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disables_tracing_in_scope() {
        let _quiet = HiddenOutput::new();
        assert!(!tracing::enabled!(tracing::Level::ERROR));
        assert!(tracing::dispatcher::get_default(|d| d.is::<NoSubscriber>()));
    }

    #[test]
    fn test_guards_nest() {
        let outer = HiddenOutput::new();
        {
            let _inner = HiddenOutput::default();
        }
        drop(outer);
    }
}
