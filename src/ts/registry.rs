use super::descriptor::Descriptor;
use super::tables::{CAT, PAT, PMT, SDT};
use std::collections::{HashMap, HashSet};

/// Program topology derived from the currently installed tables.
///
/// Holds the latest PAT, CAT and SDT plus a map from PMT PID to the
/// current PMT, and maintains the derived PID role sets:
///
/// - `pmt_pids`: program_map_PIDs of all non-zero program numbers
/// - `net_pids`: network_PIDs of program number 0
/// - `stream_pids`: elementary PIDs of all installed PMTs
/// - `pcr_pids`: PCR PIDs of all installed PMTs
/// - `other_pids`: ca_pids of CA descriptors in the CAT and the PMTs
///
/// The sets are recomputed atomically from the installed tables on every
/// replacement, so they always equal the pure function of the current
/// tables regardless of installation order.
#[derive(Debug, Clone, Default)]
pub struct ProgramRegistry {
    pat: Option<PAT>,
    cat: Option<CAT>,
    sdt: Option<SDT>,
    pmts: HashMap<u16, PMT>,
    pmt_pids: HashSet<u16>,
    net_pids: HashSet<u16>,
    stream_pids: HashSet<u16>,
    pcr_pids: HashSet<u16>,
    other_pids: HashSet<u16>,
}

impl ProgramRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The installed PAT, if any.
    pub fn pat(&self) -> Option<&PAT> {
        self.pat.as_ref()
    }

    /// The installed CAT, if any.
    pub fn cat(&self) -> Option<&CAT> {
        self.cat.as_ref()
    }

    /// The installed program SDT, if any.
    pub fn sdt(&self) -> Option<&SDT> {
        self.sdt.as_ref()
    }

    /// Installs the first PAT.
    pub fn set_pat(&mut self, pat: PAT) {
        self.pat = Some(pat);
        self.rebuild_role_sets();
    }

    /// Replaces the installed PAT, dropping the old one's contributions to
    /// the role sets before the new ones are added.
    pub fn update_pat(&mut self, pat: PAT) {
        self.set_pat(pat);
    }

    /// Installs the first CAT.
    pub fn set_cat(&mut self, cat: CAT) {
        self.cat = Some(cat);
        self.rebuild_role_sets();
    }

    /// Replaces the installed CAT.
    pub fn update_cat(&mut self, cat: CAT) {
        self.set_cat(cat);
    }

    /// Installs or replaces the program SDT.
    ///
    /// The SDT does not contribute to any role set.
    pub fn set_sdt(&mut self, sdt: SDT) {
        self.sdt = Some(sdt);
    }

    /// The current PMT installed for `pid`, if `pid` is a PMT PID.
    pub fn prog_pmt(&self, pid: u16) -> Option<&PMT> {
        if self.pmt_pids.contains(&pid) {
            self.pmts.get(&pid)
        } else {
            None
        }
    }

    /// Installs the first PMT for `pid`.
    ///
    /// Ignored when `pid` is not announced as a PMT PID by the installed
    /// PAT.
    pub fn set_prog_pmt(&mut self, pid: u16, pmt: PMT) {
        if !self.pmt_pids.contains(&pid) {
            return;
        }
        self.pmts.insert(pid, pmt);
        self.rebuild_role_sets();
    }

    /// Replaces the PMT installed for `pid`, dropping the old instance's
    /// stream, PCR and CA contributions before the new ones are added.
    pub fn update_prog_pmt(&mut self, pid: u16, pmt: PMT) {
        self.set_prog_pmt(pid, pmt);
    }

    /// PIDs carrying a PMT according to the installed PAT.
    pub fn pmt_pids(&self) -> &HashSet<u16> {
        &self.pmt_pids
    }

    /// Network PIDs according to the installed PAT.
    pub fn net_pids(&self) -> &HashSet<u16> {
        &self.net_pids
    }

    /// Elementary stream PIDs of all installed PMTs.
    pub fn stream_pids(&self) -> &HashSet<u16> {
        &self.stream_pids
    }

    /// PCR PIDs of all installed PMTs.
    pub fn pcr_pids(&self) -> &HashSet<u16> {
        &self.pcr_pids
    }

    /// CA PIDs referenced from the CAT and the installed PMTs.
    pub fn other_pids(&self) -> &HashSet<u16> {
        &self.other_pids
    }

    /// True when `pid` carries a PCR for some installed program.
    pub fn is_pcr_pid(&self, pid: u16) -> bool {
        self.pcr_pids.contains(&pid)
    }

    /// Recomputes every role set from the installed tables.
    fn rebuild_role_sets(&mut self) {
        self.pmt_pids.clear();
        self.net_pids.clear();
        self.stream_pids.clear();
        self.pcr_pids.clear();
        self.other_pids.clear();

        if let Some(pat) = &self.pat {
            for entry in &pat.programs {
                if entry.program_number == 0 {
                    if let Some(pid) = entry.network_pid {
                        self.net_pids.insert(pid);
                    }
                } else if let Some(pid) = entry.program_map_pid {
                    self.pmt_pids.insert(pid);
                }
            }
        }

        for (pid, pmt) in &self.pmts {
            // A PMT left over from a withdrawn PAT entry contributes nothing.
            if !self.pmt_pids.contains(pid) {
                continue;
            }
            self.pcr_pids.insert(pmt.pcr_pid);
            for stream in &pmt.streams {
                self.stream_pids.insert(stream.elementary_pid);
            }
            for descriptor in &pmt.descriptors {
                if let Descriptor::Ca { ca_pid, .. } = descriptor {
                    self.other_pids.insert(*ca_pid);
                }
            }
        }

        if let Some(cat) = &self.cat {
            for descriptor in &cat.descriptors {
                if let Descriptor::Ca { ca_pid, .. } = descriptor {
                    self.other_pids.insert(*ca_pid);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts::tables::{ESEntry, PATEntry};
    use pretty_assertions::assert_eq;

    fn pat_with(programs: Vec<(u16, u16)>) -> PAT {
        PAT {
            table_id: 0,
            programs: programs
                .into_iter()
                .map(|(program_number, pid)| {
                    if program_number == 0 {
                        PATEntry {
                            program_number,
                            network_pid: Some(pid),
                            program_map_pid: None,
                        }
                    } else {
                        PATEntry {
                            program_number,
                            network_pid: None,
                            program_map_pid: Some(pid),
                        }
                    }
                })
                .collect(),
            crc32_ok: true,
            ..Default::default()
        }
    }

    fn pmt_with(pcr_pid: u16, streams: Vec<(u8, u16)>) -> PMT {
        PMT {
            table_id: 2,
            pcr_pid,
            streams: streams
                .into_iter()
                .map(|(stream_type, elementary_pid)| ESEntry {
                    stream_type,
                    elementary_pid,
                })
                .collect(),
            crc32_ok: true,
            ..Default::default()
        }
    }

    fn pids(values: &[u16]) -> HashSet<u16> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_pat_installs_role_sets() {
        let mut registry = ProgramRegistry::new();
        registry.set_pat(pat_with(vec![(0, 0x10), (1, 0x20), (2, 0x21)]));

        assert_eq!(registry.net_pids(), &pids(&[0x10]));
        assert_eq!(registry.pmt_pids(), &pids(&[0x20, 0x21]));
        assert!(registry.stream_pids().is_empty());
    }

    #[test]
    fn test_pmt_update_replaces_stream_pids() {
        let mut registry = ProgramRegistry::new();
        registry.set_pat(pat_with(vec![(1, 0x20)]));
        registry.set_prog_pmt(0x20, pmt_with(0x100, vec![(0x1B, 0x100), (0x03, 0x101)]));
        assert_eq!(registry.stream_pids(), &pids(&[0x100, 0x101]));

        registry.update_prog_pmt(0x20, pmt_with(0x100, vec![(0x1B, 0x100), (0x03, 0x102)]));
        assert_eq!(registry.stream_pids(), &pids(&[0x100, 0x102]));
        assert_eq!(registry.pcr_pids(), &pids(&[0x100]));
    }

    #[test]
    fn test_pmt_for_unannounced_pid_is_ignored() {
        let mut registry = ProgramRegistry::new();
        registry.set_pat(pat_with(vec![(1, 0x20)]));
        registry.set_prog_pmt(0x30, pmt_with(0x300, vec![(0x1B, 0x300)]));

        assert!(registry.prog_pmt(0x30).is_none());
        assert!(registry.stream_pids().is_empty());
    }

    #[test]
    fn test_ca_descriptors_feed_other_pids() {
        let mut registry = ProgramRegistry::new();
        registry.set_pat(pat_with(vec![(1, 0x20)]));

        let mut pmt = pmt_with(0x100, vec![(0x1B, 0x100)]);
        pmt.descriptors.push(Descriptor::Ca {
            ca_system_id: 0x0B00,
            ca_pid: 0x200,
            private_data: vec![],
        });
        registry.set_prog_pmt(0x20, pmt);

        let mut cat = CAT {
            table_id: 1,
            crc32_ok: true,
            ..Default::default()
        };
        cat.descriptors.push(Descriptor::Ca {
            ca_system_id: 0x1722,
            ca_pid: 0x300,
            private_data: vec![],
        });
        registry.set_cat(cat);

        assert_eq!(registry.other_pids(), &pids(&[0x200, 0x300]));
    }

    #[test]
    fn test_role_sets_match_recomputation_after_any_order() {
        // Install tables in one order, then replay the final tables into a
        // fresh registry: the role sets must be identical.
        let mut registry = ProgramRegistry::new();
        registry.set_pat(pat_with(vec![(1, 0x20), (2, 0x21)]));
        registry.set_prog_pmt(0x20, pmt_with(0x100, vec![(0x1B, 0x100)]));
        registry.set_prog_pmt(0x21, pmt_with(0x100, vec![(0x04, 0x200)]));
        registry.update_pat(pat_with(vec![(1, 0x20), (0, 0x10)]));
        registry.update_prog_pmt(0x20, pmt_with(0x101, vec![(0x1B, 0x101)]));

        let mut fresh = ProgramRegistry::new();
        fresh.set_pat(registry.pat().unwrap().clone());
        for pid in registry.pmt_pids().clone() {
            if let Some(pmt) = registry.prog_pmt(pid) {
                fresh.set_prog_pmt(pid, pmt.clone());
            }
        }

        assert_eq!(registry.pmt_pids(), fresh.pmt_pids());
        assert_eq!(registry.net_pids(), fresh.net_pids());
        assert_eq!(registry.stream_pids(), fresh.stream_pids());
        assert_eq!(registry.pcr_pids(), fresh.pcr_pids());
        assert_eq!(registry.other_pids(), fresh.other_pids());

        // The shared PCR PID of the withdrawn program 2 must be gone.
        assert_eq!(registry.pcr_pids(), &pids(&[0x101]));
        assert_eq!(registry.stream_pids(), &pids(&[0x101]));
    }
}
