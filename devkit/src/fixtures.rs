/*!
Fake host trees for tests

[`FakeHost`] lays out a throwaway sysfs/procfs/dev hierarchy in a temporary
directory so topology, frequency, counter and device discovery code can run
against known values.
*/

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use turboledz_core::{HostSource, UsageCounters};

const CPU_DIR: &str = "sys/devices/system/cpu";

/// USB vendor/product pair the indicator firmware enumerates with.
pub const INDICATOR_HID_ID: &str = "0003:00002341:00008037";

/// Temporary host filesystem
pub struct FakeHost {
    dir: TempDir,
}

impl FakeHost {
    /// Empty tree with no CPUs.
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("Failed to create temporary host tree")?;
        for sub in ["sys", "proc", "dev"] {
            std::fs::create_dir_all(dir.path().join(sub))?;
        }
        Ok(Self { dir })
    }

    /// Tree with one virtual core per entry of `labels`.
    ///
    /// Virtual cores sharing a label are written as thread siblings of each
    /// other, e.g. `[0, 1, 0, 1]` gives cpu0/cpu2 and cpu1/cpu3 as pairs.
    pub fn with_topology(labels: &[usize]) -> Result<Self> {
        let host = Self::new()?;
        let cpu_dir = host.root().join(CPU_DIR);
        std::fs::create_dir_all(&cpu_dir)?;
        if !labels.is_empty() {
            write(&cpu_dir.join("online"), &format!("0-{}", labels.len() - 1))?;
        }

        for (cpu, label) in labels.iter().enumerate() {
            let siblings: Vec<String> = labels
                .iter()
                .enumerate()
                .filter(|(_, l)| *l == label)
                .map(|(i, _)| i.to_string())
                .collect();
            write(
                &cpu_dir.join(format!("cpu{cpu}/topology/thread_siblings_list")),
                &siblings.join(","),
            )?;
        }
        Ok(host)
    }

    /// Tree with `count` virtual cores, each its own physical core.
    pub fn with_cores(count: usize) -> Result<Self> {
        let labels: Vec<usize> = (0..count).collect();
        Self::with_topology(&labels)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn sys_root(&self) -> PathBuf {
        self.root().join("sys")
    }

    pub fn proc_root(&self) -> PathBuf {
        self.root().join("proc")
    }

    pub fn dev_root(&self) -> PathBuf {
        self.root().join("dev")
    }

    /// Host source reading from this tree.
    pub fn source(&self) -> HostSource {
        HostSource::with_roots(self.sys_root(), self.proc_root())
    }

    /// Scaling bounds of a virtual core, in kHz.
    pub fn set_frequency_range(&self, cpu: usize, min_khz: u64, max_khz: u64) -> Result<()> {
        self.write_cpufreq(cpu, "scaling_min_freq", min_khz)?;
        self.write_cpufreq(cpu, "scaling_max_freq", max_khz)
    }

    pub fn set_current_frequency(&self, cpu: usize, khz: u64) -> Result<()> {
        self.write_cpufreq(cpu, "scaling_cur_freq", khz)
    }

    fn write_cpufreq(&self, cpu: usize, name: &str, khz: u64) -> Result<()> {
        let path = self.root().join(CPU_DIR).join(format!("cpu{cpu}/cpufreq/{name}"));
        write(&path, &khz.to_string())
    }

    /// Replace `/proc/stat` with an aggregate line plus one line per core.
    pub fn set_stat(&self, aggregate: UsageCounters, per_core: &[UsageCounters]) -> Result<()> {
        let mut content = stat_line("cpu ", &aggregate);
        for (cpu, counters) in per_core.iter().enumerate() {
            content.push_str(&stat_line(&format!("cpu{cpu}"), counters));
        }
        content.push_str("intr 0\nctxt 0\nbtime 0\nprocesses 1\n");
        write(&self.proc_root().join("stat"), &content)
    }

    /// Register a hidraw node whose sysfs entry reports `hid_id` and `hid_name`.
    ///
    /// The device node is created as a plain file with mode `mode`.
    pub fn add_hidraw(&self, index: usize, hid_id: &str, hid_name: &str, mode: u32) -> Result<PathBuf> {
        let uevent = self
            .sys_root()
            .join(format!("class/hidraw/hidraw{index}/device/uevent"));
        write(
            &uevent,
            &format!("DRIVER=hid-generic\nHID_ID={hid_id}\nHID_NAME={hid_name}\nHID_PHYS=usb-0000:00:14.0-1/input2\n"),
        )?;

        let node = self.dev_root().join(format!("hidraw{index}"));
        write(&node, "")?;
        set_mode(&node, mode)?;
        Ok(node)
    }

    /// Register a world-accessible indicator of the given product name.
    pub fn add_indicator(&self, index: usize, product: &str) -> Result<PathBuf> {
        self.add_hidraw(index, INDICATOR_HID_ID, product, 0o666)
    }
}

fn stat_line(tag: &str, counters: &UsageCounters) -> String {
    let fields: Vec<String> = counters.0.iter().map(|c| c.to_string()).collect();
    format!("{tag} {} 0 0 0\n", fields.join(" "))
}

fn write(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to chmod {}", path.display()))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
