//! Device-node discovery for attached ports
//!
//! After a remote device is attached, the kernel materializes it under a
//! virtual host controller (`vhci_hcd.*`) in sysfs, and its device nodes
//! (`/dev/ttyUSB0`, `/dev/hidraw1`, ...) hang off that subtree. This module
//! maps a local port number to the sysfs device directory and walks it for
//! everything user space can actually open.
//!
//! Port-to-directory mapping has two historical conventions (the device
//! directory is named for port or port+1 depending on tool revision), so a
//! candidate directory is never trusted by name alone: its `devpath`
//! attribute has to agree before it is accepted.

use common::run_command;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory-name marker of virtual (network-attached) host controllers
const VHCI_MARKER: &str = "vhci_hcd";

/// Recursion cap for the device-node walk
const MAX_DEPTH: usize = 10;

/// Maps a sysfs directory to its device-node name
///
/// Production asks udev; tests read a file planted in the synthetic tree.
pub trait NodeNameResolver {
    fn node_name(&self, syspath: &Path) -> Option<String>;
}

/// `udevadm info -q name -p <syspath>`
#[derive(Debug, Clone, Default)]
pub struct UdevadmResolver;

impl NodeNameResolver for UdevadmResolver {
    fn node_name(&self, syspath: &Path) -> Option<String> {
        let path = syspath.to_string_lossy();
        let output = run_command("udevadm", &["info", "-q", "name", "-p", &path]).ok()?;
        if !output.success() {
            return None;
        }
        let name = output.stdout.trim();
        // udevadm prints the sysfs path back for nodes it cannot name
        if name.is_empty() || name.starts_with("/sys") {
            return None;
        }
        Some(name.to_string())
    }
}

/// Sysfs roots used for discovery; injectable so tests run on temp trees
#[derive(Debug, Clone)]
pub struct SysfsLayout {
    /// Platform device directory holding the vhci controllers
    pub platform: PathBuf,
    /// Generic USB bus device listing
    pub usb_devices: PathBuf,
}

impl Default for SysfsLayout {
    fn default() -> Self {
        Self {
            platform: PathBuf::from("/sys/devices/platform"),
            usb_devices: PathBuf::from("/sys/bus/usb/devices"),
        }
    }
}

/// Finds the device-node files backing a local vhci port
#[derive(Debug, Clone)]
pub struct DeviceFileResolver<R = UdevadmResolver> {
    layout: SysfsLayout,
    resolver: R,
}

impl DeviceFileResolver<UdevadmResolver> {
    pub fn new() -> Self {
        Self {
            layout: SysfsLayout::default(),
            resolver: UdevadmResolver,
        }
    }
}

impl Default for DeviceFileResolver<UdevadmResolver> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: NodeNameResolver> DeviceFileResolver<R> {
    pub fn with_layout(layout: SysfsLayout, resolver: R) -> Self {
        Self { layout, resolver }
    }

    /// Find all device-node paths for a local port number
    ///
    /// Tries the direct vhci controller path first, then falls back to
    /// scanning the generic bus listing for entries that resolve into a vhci
    /// subtree. An empty set is a normal outcome — the kernel may simply not
    /// have created the nodes yet.
    pub fn find_device_files(&self, port_number: u32) -> BTreeSet<String> {
        let mut candidates = self.direct_candidates(port_number);
        if candidates.is_empty() {
            candidates = self.fallback_candidates(port_number);
        }

        let mut files = BTreeSet::new();
        for candidate in candidates {
            files.extend(self.collect_dev_files(&candidate));
        }
        files
    }

    /// Phase 1: `{platform}/vhci_hcd.*/usb{N}/{N}-{port+1}`, devpath-verified
    ///
    /// vhci ports map to 1-indexed device paths: local port 0 becomes device
    /// directory `{bus}-1`. The first candidate whose `devpath` attribute
    /// agrees wins; a name collision with a mismatching devpath is skipped.
    fn direct_candidates(&self, port_number: u32) -> Vec<PathBuf> {
        let Ok(controllers) = fs::read_dir(&self.layout.platform) else {
            return Vec::new();
        };

        let expected = port_number + 1;
        for controller in controllers.flatten() {
            let name = controller.file_name().to_string_lossy().into_owned();
            if !name.starts_with(VHCI_MARKER) {
                continue;
            }
            let Ok(buses) = fs::read_dir(controller.path()) else {
                continue;
            };
            for bus in buses.flatten() {
                let bus_name = bus.file_name().to_string_lossy().into_owned();
                let Some(bus_num) = bus_name.strip_prefix("usb") else {
                    continue;
                };
                let device_dir = bus.path().join(format!("{}-{}", bus_num, expected));
                if !device_dir.exists() {
                    continue;
                }
                if let Some(devpath) = read_attribute(&device_dir, "devpath") {
                    if devpath != expected.to_string() {
                        debug!(
                            "Port {}: skipping {} - devpath={} does not match expected {}",
                            port_number,
                            device_dir.display(),
                            devpath,
                            expected
                        );
                        continue;
                    }
                }
                return vec![device_dir];
            }
        }
        Vec::new()
    }

    /// Phase 2: scan the generic bus listing for vhci-backed entries
    ///
    /// Accepts a `devpath` of either the port number or port number + 1;
    /// both numbering conventions have shipped and the attribute, not the
    /// directory name, is what disambiguates them.
    fn fallback_candidates(&self, port_number: u32) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.layout.usb_devices) else {
            return Vec::new();
        };

        let accepted = [port_number.to_string(), (port_number + 1).to_string()];
        let mut candidates = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(real) = fs::canonicalize(&path) else {
                continue;
            };
            if !real.to_string_lossy().contains(VHCI_MARKER) {
                continue;
            }
            match read_attribute(&path, "devpath") {
                Some(devpath) if accepted.contains(&devpath) => candidates.push(path),
                _ => {}
            }
        }
        candidates
    }

    /// Walk a device directory for everything carrying a device node
    ///
    /// A directory has a node iff it has a `dev` attribute. The walk descends
    /// into real subdirectories only, skips subtrees that are themselves USB
    /// devices (`busnum` present - the traversal would have wandered into an
    /// unrelated device), is depth-capped, and visits each symlink-resolved
    /// path at most once.
    fn collect_dev_files(&self, device_dir: &Path) -> BTreeSet<String> {
        let mut files = BTreeSet::new();
        let mut visited = HashSet::new();
        self.walk(device_dir, 0, &mut visited, &mut files);
        files
    }

    fn walk(
        &self,
        path: &Path,
        depth: usize,
        visited: &mut HashSet<PathBuf>,
        files: &mut BTreeSet<String>,
    ) {
        if depth > MAX_DEPTH {
            return;
        }

        let real = match fs::canonicalize(path) {
            Ok(real) => real,
            Err(e) => {
                debug!("Error resolving {}: {}", path.display(), e);
                return;
            }
        };
        if !visited.insert(real) {
            return;
        }

        if path.join("dev").exists() {
            if let Some(name) = self.resolver.node_name(path) {
                let dev_path = if name.starts_with('/') {
                    name
                } else {
                    format!("/dev/{}", name)
                };
                files.insert(dev_path);
            }
        }

        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Error reading {}: {}", path.display(), e);
                return;
            }
        };
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            // Interface directories are real dirs and get descended;
            // symlinks (driver, subsystem, ...) would lead all over sysfs
            if !file_type.is_dir() || file_type.is_symlink() {
                continue;
            }
            let child = entry.path();
            if child.join("busnum").exists() {
                // A distinct USB device's subtree
                continue;
            }
            self.walk(&child, depth + 1, visited, files);
        }
    }
}

fn read_attribute(dir: &Path, name: &str) -> Option<String> {
    fs::read_to_string(dir.join(name))
        .ok()
        .map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    /// Resolves node names from a `devname` file planted next to `dev`
    struct PlantedResolver;

    impl NodeNameResolver for PlantedResolver {
        fn node_name(&self, syspath: &Path) -> Option<String> {
            fs::read_to_string(syspath.join("devname"))
                .ok()
                .map(|s| s.trim().to_string())
        }
    }

    struct TestTree {
        _dir: tempfile::TempDir,
        layout: SysfsLayout,
    }

    impl TestTree {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let layout = SysfsLayout {
                platform: dir.path().join("devices/platform"),
                usb_devices: dir.path().join("bus/usb/devices"),
            };
            fs::create_dir_all(&layout.platform).unwrap();
            fs::create_dir_all(&layout.usb_devices).unwrap();
            Self { _dir: dir, layout }
        }

        fn resolver(&self) -> DeviceFileResolver<PlantedResolver> {
            DeviceFileResolver::with_layout(self.layout.clone(), PlantedResolver)
        }

        /// Create a vhci device dir `{bus}-{index}` with a devpath attribute
        fn vhci_device(&self, bus: u32, index: u32, devpath: &str) -> PathBuf {
            let dir = self
                .layout
                .platform
                .join("vhci_hcd.0")
                .join(format!("usb{}", bus))
                .join(format!("{}-{}", bus, index));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("devpath"), format!("{}\n", devpath)).unwrap();
            dir
        }

        fn plant_node(&self, dir: &Path, name: &str) {
            fs::create_dir_all(dir).unwrap();
            fs::write(dir.join("dev"), "189:1\n").unwrap();
            fs::write(dir.join("devname"), format!("{}\n", name)).unwrap();
        }
    }

    #[test]
    fn test_direct_phase_finds_node_files() {
        let tree = TestTree::new();
        // Local port 0 materializes as device dir 3-1 with devpath 1
        let device = tree.vhci_device(3, 1, "1");
        let iface = device.join("3-1:1.0");
        tree.plant_node(&iface, "ttyACM0");

        let files = tree.resolver().find_device_files(0);
        assert_eq!(
            files.into_iter().collect::<Vec<_>>(),
            vec!["/dev/ttyACM0".to_string()]
        );
    }

    #[test]
    fn test_devpath_mismatch_rejects_candidate() {
        let tree = TestTree::new();
        // Directory is named 3-1 but records a different devpath
        let device = tree.vhci_device(3, 1, "7");
        tree.plant_node(&device.join("3-1:1.0"), "ttyACM0");

        assert!(tree.resolver().find_device_files(0).is_empty());
    }

    #[test]
    fn test_fallback_accepts_both_offsets() {
        for devpath in ["2", "3"] {
            let tree = TestTree::new();
            // Nothing under the expected direct name for port 2...
            let device = tree.vhci_device(4, 9, devpath);
            tree.plant_node(&device.join("4-9:1.0"), "hidraw0");
            // ...but the bus listing links to the vhci subtree
            symlink(&device, tree.layout.usb_devices.join("4-9")).unwrap();

            let files = tree.resolver().find_device_files(2);
            assert_eq!(
                files.into_iter().collect::<Vec<_>>(),
                vec!["/dev/hidraw0".to_string()],
                "devpath {} should satisfy the fallback",
                devpath
            );
        }
    }

    #[test]
    fn test_fallback_ignores_non_vhci_entries() {
        let tree = TestTree::new();
        // A physically-attached device with a matching devpath
        let physical = tree._dir.path().join("devices/pci0000:00/usb1/1-3");
        fs::create_dir_all(&physical).unwrap();
        fs::write(physical.join("devpath"), "3\n").unwrap();
        symlink(&physical, tree.layout.usb_devices.join("1-3")).unwrap();

        assert!(tree.resolver().find_device_files(3).is_empty());
    }

    #[test]
    fn test_busnum_subtree_is_not_descended() {
        let tree = TestTree::new();
        let device = tree.vhci_device(3, 1, "1");
        tree.plant_node(&device.join("3-1:1.0"), "ttyUSB0");

        // A nested hub-attached device: its nodes belong to someone else
        let foreign = device.join("3-1.2");
        tree.plant_node(&foreign, "ttyUSB9");
        fs::write(foreign.join("busnum"), "3\n").unwrap();

        let files = tree.resolver().find_device_files(0);
        assert_eq!(
            files.into_iter().collect::<Vec<_>>(),
            vec!["/dev/ttyUSB0".to_string()]
        );
    }

    #[test]
    fn test_symlink_cycle_terminates_with_finite_set() {
        let tree = TestTree::new();
        let device = tree.vhci_device(3, 1, "1");
        let iface = device.join("3-1:1.0");
        tree.plant_node(&iface, "ttyACM0");
        // Cycle: interface links back up to the device directory
        symlink(&device, iface.join("loop")).unwrap();

        let files = tree.resolver().find_device_files(0);
        assert_eq!(files.len(), 1);
        assert!(files.contains("/dev/ttyACM0"));
    }

    #[test]
    fn test_deep_nesting_is_capped() {
        let tree = TestTree::new();
        let device = tree.vhci_device(3, 1, "1");
        let mut deep = device.clone();
        for i in 0..15 {
            deep = deep.join(format!("level{}", i));
        }
        tree.plant_node(&deep, "unreachable0");

        // The node sits past the depth cap and must not be reported
        assert!(tree.resolver().find_device_files(0).is_empty());
    }

    #[test]
    fn test_multiple_nodes_deduplicated_and_sorted() {
        let tree = TestTree::new();
        let device = tree.vhci_device(3, 1, "1");
        tree.plant_node(&device.join("3-1:1.0"), "ttyACM0");
        tree.plant_node(&device.join("3-1:1.2"), "hidraw1");

        let files: Vec<_> = tree.resolver().find_device_files(0).into_iter().collect();
        assert_eq!(
            files,
            vec!["/dev/hidraw1".to_string(), "/dev/ttyACM0".to_string()]
        );
    }

    #[test]
    fn test_absolute_node_name_is_kept_as_is() {
        let tree = TestTree::new();
        let device = tree.vhci_device(3, 1, "1");
        tree.plant_node(&device, "/dev/bus/usb/003/002");

        let files = tree.resolver().find_device_files(0);
        assert!(files.contains("/dev/bus/usb/003/002"));
    }

    #[test]
    fn test_missing_roots_yield_empty_set() {
        let layout = SysfsLayout {
            platform: PathBuf::from("/nonexistent/platform"),
            usb_devices: PathBuf::from("/nonexistent/usb"),
        };
        let resolver = DeviceFileResolver::with_layout(layout, PlantedResolver);
        assert!(resolver.find_device_files(0).is_empty());
    }
}
