//! Replica locations and their resolution to hosts.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// One concrete place a datum's value can be obtained from.
///
/// Identity is structural: two locations are the same replica when every
/// field matches.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataLocation {
    /// A file on a single host.
    Private {
        /// Host holding the file.
        host: String,
        /// Path on that host.
        path: String,
    },
    /// A file on a named shared disk, reachable from every host mounting it.
    Shared {
        /// Shared disk name.
        disk: String,
        /// Path relative to the disk's mount point.
        path: String,
    },
    /// An object stored by an external persistence backend.
    Persistent {
        /// Opaque backend identifier.
        id: String,
    },
    /// A foreign in-memory object held by a language binding on one host.
    Binding {
        /// Host holding the object.
        host: String,
        /// Binding object identifier.
        id: String,
    },
}

impl DataLocation {
    /// Private file location.
    pub fn private(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Private {
            host: host.into(),
            path: path.into(),
        }
    }

    /// Shared disk location.
    pub fn shared(disk: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Shared {
            disk: disk.into(),
            path: path.into(),
        }
    }

    /// Persistent object location.
    pub fn persistent(id: impl Into<String>) -> Self {
        Self::Persistent { id: id.into() }
    }

    /// Binding object location.
    pub fn binding(host: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Binding {
            host: host.into(),
            id: id.into(),
        }
    }

    /// The single host of a Private or Binding location.
    pub fn fixed_host(&self) -> Option<&str> {
        match self {
            Self::Private { host, .. } | Self::Binding { host, .. } => Some(host),
            Self::Shared { .. } | Self::Persistent { .. } => None,
        }
    }

    /// Resolve to `(host, path)` pairs given the current shared disk mounts.
    ///
    /// Persistent locations resolve to nothing: they are available everywhere
    /// without being on any host.
    pub fn resolve(&self, mounts: &SharedMounts) -> Vec<(String, String)> {
        match self {
            Self::Private { host, path } => vec![(host.clone(), path.clone())],
            Self::Binding { host, id } => vec![(host.clone(), id.clone())],
            Self::Shared { disk, path } => mounts
                .hosts_of(disk)
                .map(|(host, mount)| (host.to_owned(), join_path(mount, path)))
                .collect(),
            Self::Persistent { .. } => Vec::new(),
        }
    }

    /// Path of this location as seen from `host`, if reachable there.
    pub fn path_on(&self, host: &str, mounts: &SharedMounts) -> Option<String> {
        match self {
            Self::Private { host: h, path } if h == host => Some(path.clone()),
            Self::Binding { host: h, id } if h == host => Some(id.clone()),
            Self::Shared { disk, path } => mounts
                .mount_point(disk, host)
                .map(|mount| join_path(mount, path)),
            Self::Persistent { id } => Some(id.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for DataLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Private { host, path } => write!(f, "file://{host}{path}"),
            Self::Shared { disk, path } => write!(f, "shared://{disk}{path}"),
            Self::Persistent { id } => write!(f, "persistent://{id}"),
            Self::Binding { host, id } => write!(f, "binding://{host}/{id}"),
        }
    }
}

fn join_path(mount: &str, path: &str) -> String {
    match (mount.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{mount}{}", &path[1..]),
        (false, false) => format!("{mount}/{path}"),
        _ => format!("{mount}{path}"),
    }
}

/// Which hosts mount which shared disks, and where.
#[derive(Debug, Clone, Default)]
pub struct SharedMounts {
    disks: HashMap<String, BTreeMap<String, String>>,
}

impl SharedMounts {
    /// Record that `host` mounts `disk` at `mount_point`.
    pub fn mount(&mut self, disk: &str, host: &str, mount_point: &str) {
        self.disks
            .entry(disk.to_owned())
            .or_default()
            .insert(host.to_owned(), mount_point.to_owned());
    }

    /// Remove `host` from every disk; returns the disks it was mounting.
    pub fn unmount_host(&mut self, host: &str) -> Vec<String> {
        let mut disks = Vec::new();
        for (disk, hosts) in &mut self.disks {
            if hosts.remove(host).is_some() {
                disks.push(disk.clone());
            }
        }
        disks.sort();
        disks
    }

    /// Hosts mounting `disk` with their mount points, in host order.
    pub fn hosts_of<'a>(&'a self, disk: &str) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.disks
            .get(disk)
            .into_iter()
            .flat_map(|hosts| hosts.iter().map(|(h, m)| (h.as_str(), m.as_str())))
    }

    /// Mount point of `disk` on `host`.
    pub fn mount_point(&self, disk: &str, host: &str) -> Option<&str> {
        self.disks.get(disk)?.get(host).map(String::as_str)
    }

    /// Disks mounted by `host`.
    pub fn disks_of(&self, host: &str) -> Vec<String> {
        let mut disks: Vec<String> = self
            .disks
            .iter()
            .filter(|(_, hosts)| hosts.contains_key(host))
            .map(|(disk, _)| disk.clone())
            .collect();
        disks.sort();
        disks
    }

    /// True when some host other than `excluded` still mounts `disk`.
    pub fn has_other_host(&self, disk: &str, excluded: &str) -> bool {
        self.hosts_of(disk).any(|(h, _)| h != excluded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_variants() {
        let mut mounts = SharedMounts::default();
        mounts.mount("gpfs", "node1", "/gpfs");
        mounts.mount("gpfs", "node2", "/mnt/gpfs/");

        let private = DataLocation::private("node1", "/tmp/d1");
        assert_eq!(private.resolve(&mounts), vec![("node1".into(), "/tmp/d1".into())]);

        let shared = DataLocation::shared("gpfs", "/apps/d1");
        assert_eq!(
            shared.resolve(&mounts),
            vec![
                ("node1".into(), "/gpfs/apps/d1".into()),
                ("node2".into(), "/mnt/gpfs/apps/d1".into()),
            ]
        );

        assert!(DataLocation::persistent("psco-1").resolve(&mounts).is_empty());
        assert_eq!(
            DataLocation::binding("node2", "obj#3").resolve(&mounts),
            vec![("node2".into(), "obj#3".into())]
        );
    }

    #[test]
    fn test_path_on_host() {
        let mut mounts = SharedMounts::default();
        mounts.mount("scratch", "node1", "/scratch");
        let shared = DataLocation::shared("scratch", "d2");
        assert_eq!(shared.path_on("node1", &mounts).as_deref(), Some("/scratch/d2"));
        assert_eq!(shared.path_on("node9", &mounts), None);
        assert_eq!(
            DataLocation::private("node1", "/x").path_on("node2", &mounts),
            None
        );
    }

    #[test]
    fn test_unmount_host() {
        let mut mounts = SharedMounts::default();
        mounts.mount("a", "node1", "/a");
        mounts.mount("b", "node1", "/b");
        mounts.mount("b", "node2", "/b");
        assert_eq!(mounts.unmount_host("node1"), vec!["a".to_string(), "b".to_string()]);
        assert!(!mounts.has_other_host("a", "node2"));
        assert!(mounts.has_other_host("b", "node1"));
        assert!(mounts.disks_of("node1").is_empty());
    }

    #[test]
    fn test_location_serde_tagged() {
        let loc = DataLocation::private("node1", "/tmp/x");
        let json = serde_json::to_string(&loc).unwrap();
        assert_eq!(json, r#"{"type":"private","host":"node1","path":"/tmp/x"}"#);
        assert_eq!(loc.to_string(), "file://node1/tmp/x");
    }
}
