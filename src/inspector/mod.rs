pub mod browser;
pub mod command;
pub mod files;
pub mod processes;
pub mod scanner;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::executor::ToolAdapter;

/// Wires one adapter per builtin ToolSpec. Adapter names must stay in step
/// with the registry catalog; the orchestrator treats a missing adapter as a
/// failed step rather than a startup error.
pub fn builtin_adapters(
    settings: &Settings,
    home: &Path,
) -> BTreeMap<String, Arc<dyn ToolAdapter>> {
    let tool_timeout = Duration::from_secs(settings.tool_timeout_seconds);
    let scan_timeout = Duration::from_secs(settings.scan_timeout_seconds);
    let mut adapters: BTreeMap<String, Arc<dyn ToolAdapter>> = BTreeMap::new();
    adapters.insert(
        "list_processes".to_string(),
        Arc::new(processes::ListProcessesAdapter::new(tool_timeout)),
    );
    adapters.insert(
        "read_file".to_string(),
        Arc::new(files::ReadFileAdapter),
    );
    adapters.insert(
        "scan_file".to_string(),
        Arc::new(scanner::ClamScanAdapter::new(scan_timeout)),
    );
    adapters.insert(
        "find_files".to_string(),
        Arc::new(files::FindFilesAdapter::new(home)),
    );
    adapters.insert(
        "get_file_info".to_string(),
        Arc::new(files::FileInfoAdapter),
    );
    adapters.insert(
        "list_directory".to_string(),
        Arc::new(files::ListDirectoryAdapter),
    );
    adapters.insert(
        "check_browser_extensions".to_string(),
        Arc::new(browser::BrowserExtensionsAdapter::new(home)),
    );
    adapters.insert(
        "check_startup_items".to_string(),
        Arc::new(browser::StartupItemsAdapter::new(home)),
    );
    adapters.insert(
        "get_network_connections".to_string(),
        Arc::new(processes::NetworkConnectionsAdapter::new(tool_timeout)),
    );
    adapters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ToolRegistry;

    #[test]
    fn every_catalog_tool_has_an_adapter() {
        let registry = ToolRegistry::builtin().expect("catalog");
        let adapters = builtin_adapters(&Settings::default(), Path::new("/Users/tester"));
        for spec in registry.list_tools() {
            assert!(
                adapters.contains_key(&spec.name),
                "missing adapter for {}",
                spec.name
            );
        }
        assert_eq!(adapters.len(), registry.list_tools().len());
    }
}
