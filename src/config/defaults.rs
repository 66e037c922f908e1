/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use serde::{Deserialize, Serialize};

/// Lab-wide settings shared by both roles of every experiment in a suite. Every key is optional
/// in the `[defaults]` table; missing keys fall back to the values below.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Defaults {
    /// Prepended to every pane name. Distinct prefixes let two suites share a tmux session.
    pub pane_prefix: String,
    /// Typed into every freshly created pane of a remote machine.
    pub remote_connect_cmd: String,

    pub guest_user: String,
    pub guest_password: String,

    pub stack_dir: String,
    pub guest_stack_dir: String,
    pub bench_dir: String,
    pub guest_bench_dir: String,

    pub comp_cmd: String,
    pub clean_cmd: String,
    /// Run `clean_cmd` before every build.
    pub clean_build: bool,

    /// Guest interface carrying the VM's management address.
    pub vm_interface: String,
    /// Guest interface handed to the fast-path stack.
    pub guest_stack_interface: String,
    pub guest_pci_id: String,
    pub host_pci_id: String,
    pub lcores: String,
    /// Vendor and device id registered with vfio-pci inside guests.
    pub vfio_ids: String,
    pub huge_pages: u32,

    pub switch_dir: String,
    /// Rebuild and install the virtual switch before starting it.
    pub switch_install: bool,
    pub bridge: String,

    pub proxy_socket: String,
    /// Delete remote benchmark logs after copying them back.
    pub remote_log_delete: bool,
}
impl Default for Defaults {
    fn default() -> Self {
        Self {
            pane_prefix: "e_".to_string(),
            remote_connect_cmd: "ssh swsnetlab04".to_string(),
            guest_user: "tas".to_string(),
            guest_password: "tas".to_string(),
            stack_dir: "/local/mstolet/projects/tas".to_string(),
            guest_stack_dir: "/home/tas/projects/tas".to_string(),
            bench_dir: "/local/mstolet/projects/benchmarks".to_string(),
            guest_bench_dir: "/home/tas/projects/benchmarks".to_string(),
            comp_cmd: "make -j6".to_string(),
            clean_cmd: "make clean".to_string(),
            clean_build: false,
            vm_interface: "enp0s3".to_string(),
            guest_stack_interface: "enp0s3".to_string(),
            guest_pci_id: "0000:00:03.0".to_string(),
            host_pci_id: "3b:00.0".to_string(),
            lcores: "0@0,1@2,2@4,3@6,4@8,5@10,6@12,7@14,8@16,9@18,10@20".to_string(),
            vfio_ids: "1af4 1110".to_string(),
            huge_pages: 8192,
            switch_dir: "/local/mstolet/projects/ovs".to_string(),
            switch_install: false,
            bridge: "br0".to_string(),
            proxy_socket: "/run/tasproxy".to_string(),
            remote_log_delete: true,
        }
    }
}
impl Defaults {
    /// The clean command when clean builds are enabled.
    pub fn clean_cmd(&self) -> Option<String> {
        self.clean_build.then(|| self.clean_cmd.clone())
    }

    pub fn stack_dir(&self, guest: bool) -> &str {
        if guest {
            &self.guest_stack_dir
        } else {
            &self.stack_dir
        }
    }

    pub fn bench_dir(&self, guest: bool) -> &str {
        if guest {
            &self.guest_bench_dir
        } else {
            &self.bench_dir
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_tables_keep_remaining_defaults() -> anyhow::Result<()> {
        let defaults: Defaults = toml::from_str("pane_prefix = \"x_\"\nclean_build = true\n")?;
        assert_eq!(defaults.pane_prefix, "x_");
        assert_eq!(defaults.clean_cmd(), Some("make clean".to_string()));
        assert_eq!(defaults.guest_user, "tas");
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Defaults>("pane_prefx = \"x_\"\n").is_err());
    }
}
