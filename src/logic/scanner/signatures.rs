//! Signature database for the hash and fuzzy-hash stages.
//!
//! Definitions load from a directory of flat files, one per family.
//! Hash maps carry hex digest keys and malware family labels. The
//! VirusShare corpus is a bare MD5 set and the MalShare corpus a list
//! of ssdeep digests; both produce fixed labels on a hit. Missing
//! definition files simply leave that stage empty.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::constants::CONTENT_RULES_FILE;
use crate::logic::scanner::hashes;

// ============================================================================
// CONSTANTS
// ============================================================================

const SHA256_DB_FILE: &str = "sha256.json";
const MD5_DB_FILE: &str = "md5.json";
const SHA1_DB_FILE: &str = "sha1.json";
const TLSH_DB_FILE: &str = "tlsh.json";
const VIRUSSHARE_DB_FILE: &str = "virusshare_md5.txt";
const SSDEEP_DB_FILE: &str = "ssdeep.txt";

/// Placeholder digest stored for samples TLSH could not fingerprint.
const TLSH_NULL_DIGEST: &str = "TNULL";

// ============================================================================
// PUBLIC API
// ============================================================================

/// All loaded signature corpora.
#[derive(Debug, Default)]
pub struct SignatureStore {
    sha256: HashMap<String, String>,
    md5: HashMap<String, String>,
    sha1: HashMap<String, String>,
    tlsh: HashMap<String, String>,
    known_bad_md5: HashSet<String>,
    fuzzy_refs: Vec<String>,
}

impl SignatureStore {
    pub fn new(
        sha256: HashMap<String, String>,
        md5: HashMap<String, String>,
        sha1: HashMap<String, String>,
        tlsh: HashMap<String, String>,
        known_bad_md5: HashSet<String>,
        fuzzy_refs: Vec<String>,
    ) -> Self {
        Self {
            sha256,
            md5,
            sha1,
            tlsh,
            known_bad_md5,
            fuzzy_refs,
        }
    }

    /// Loads every definition file found under `dir`.
    pub fn load(dir: &Path) -> Self {
        let store = Self {
            sha256: load_label_map(&dir.join(SHA256_DB_FILE)),
            md5: load_label_map(&dir.join(MD5_DB_FILE)),
            sha1: load_label_map(&dir.join(SHA1_DB_FILE)),
            tlsh: load_label_map(&dir.join(TLSH_DB_FILE)),
            known_bad_md5: load_line_set(&dir.join(VIRUSSHARE_DB_FILE)),
            fuzzy_refs: load_line_list(&dir.join(SSDEEP_DB_FILE)),
        };
        log::info!(
            "Loaded {} signatures from {}",
            store.total_signatures(),
            dir.display()
        );
        store
    }

    pub fn match_sha256(&self, digest: &str) -> Option<&str> {
        self.sha256.get(digest).map(String::as_str)
    }

    pub fn match_md5(&self, digest: &str) -> Option<&str> {
        self.md5.get(digest).map(String::as_str)
    }

    pub fn match_sha1(&self, digest: &str) -> Option<&str> {
        self.sha1.get(digest).map(String::as_str)
    }

    /// Closest stored TLSH digest within `cutoff`, if any.
    pub fn match_tlsh(&self, digest: &str, cutoff: u32) -> Option<&str> {
        let mut best: Option<(u32, &str)> = None;
        for (stored, label) in &self.tlsh {
            if stored == TLSH_NULL_DIGEST {
                continue;
            }
            let Some(distance) = hashes::tlsh_digest_distance(digest, stored) else {
                continue;
            };
            if distance > cutoff {
                continue;
            }
            let closer = match best {
                None => true,
                Some((best_distance, best_label)) => {
                    distance < best_distance
                        || (distance == best_distance && label.as_str() < best_label)
                }
            };
            if closer {
                best = Some((distance, label.as_str()));
            }
        }
        best.map(|(_, label)| label)
    }

    pub fn is_known_bad_md5(&self, digest: &str) -> bool {
        self.known_bad_md5.contains(digest)
    }

    /// First stored ssdeep digest at or above the similarity cutoff,
    /// returned as its similarity score.
    pub fn match_fuzzy(&self, digest: &str, cutoff: u32) -> Option<u32> {
        self.fuzzy_refs
            .iter()
            .map(|stored| hashes::fuzzy_similarity(digest, stored))
            .find(|similarity| *similarity >= cutoff)
    }

    pub fn total_signatures(&self) -> usize {
        self.sha256.len()
            + self.md5.len()
            + self.sha1.len()
            + self.tlsh.len()
            + self.known_bad_md5.len()
            + self.fuzzy_refs.len()
    }
}

// ============================================================================
// INTERNAL IMPLEMENTATION
// ============================================================================

fn load_label_map(path: &Path) -> HashMap<String, String> {
    let Ok(text) = fs::read_to_string(path) else {
        return HashMap::new();
    };
    match serde_json::from_str(&text) {
        Ok(map) => map,
        Err(e) => {
            log::warn!("Skipping unreadable definitions {}: {}", path.display(), e);
            HashMap::new()
        }
    }
}

fn load_line_set(path: &Path) -> HashSet<String> {
    load_line_list(path).into_iter().collect()
}

fn load_line_list(path: &Path) -> Vec<String> {
    let Ok(text) = fs::read_to_string(path) else {
        return Vec::new();
    };
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// True when `dir` holds at least one definition file. The content rule
/// file is included so a definitions check covers every stage.
pub fn definitions_present(dir: &Path) -> bool {
    [
        SHA256_DB_FILE,
        MD5_DB_FILE,
        SHA1_DB_FILE,
        TLSH_DB_FILE,
        VIRUSSHARE_DB_FILE,
        SSDEEP_DB_FILE,
        CONTENT_RULES_FILE,
    ]
    .iter()
    .any(|name| dir.join(name).exists())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn single(key: &str, label: &str) -> HashMap<String, String> {
        HashMap::from([(key.to_string(), label.to_string())])
    }

    #[test]
    fn test_exact_lookups() {
        let store = SignatureStore::new(
            single("aa", "Family.A"),
            single("bb", "Family.B"),
            single("cc", "Family.C"),
            HashMap::new(),
            HashSet::from(["dd".to_string()]),
            Vec::new(),
        );
        assert_eq!(store.match_sha256("aa"), Some("Family.A"));
        assert_eq!(store.match_md5("bb"), Some("Family.B"));
        assert_eq!(store.match_sha1("cc"), Some("Family.C"));
        assert!(store.is_known_bad_md5("dd"));
        assert_eq!(store.match_sha256("zz"), None);
        assert!(!store.is_known_bad_md5("zz"));
    }

    #[test]
    fn test_tlsh_match_skips_null_and_respects_cutoff() {
        let mut tlsh = HashMap::new();
        tlsh.insert("TNULL".to_string(), "Placeholder".to_string());
        tlsh.insert("T1AAAAAA00000000".to_string(), "Family.T".to_string());
        let store =
            SignatureStore::new(HashMap::new(), HashMap::new(), HashMap::new(), tlsh, HashSet::new(), Vec::new());

        assert_eq!(store.match_tlsh("T1AAAAAA00000001", 30), Some("Family.T"));
        assert_eq!(store.match_tlsh("T1AAAAAA0000FFFF", 30), None);
        assert_eq!(store.match_tlsh("TNULL", 30), None);
    }

    #[test]
    fn test_fuzzy_match_uses_cutoff() {
        let sample: Vec<u8> = (0..4096).map(|i| (i * 31 % 251) as u8).collect();
        let digest = hashes::fuzzy_digest(&sample).unwrap();
        let store = SignatureStore::new(
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
            HashSet::new(),
            vec![digest.clone()],
        );
        assert_eq!(store.match_fuzzy(&digest, 80), Some(100));
        assert_eq!(store.match_fuzzy("3:abc:def", 80), None);
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("sha256.json"),
            br#"{"aa": "Family.A"}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("virusshare_md5.txt"), "dd\n\nee\n").unwrap();

        let store = SignatureStore::load(dir.path());
        assert_eq!(store.match_sha256("aa"), Some("Family.A"));
        assert!(store.is_known_bad_md5("dd"));
        assert!(store.is_known_bad_md5("ee"));
        assert_eq!(store.total_signatures(), 3);
        assert!(definitions_present(dir.path()));
    }

    #[test]
    fn test_load_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("definitions");
        let store = SignatureStore::load(&missing);
        assert_eq!(store.total_signatures(), 0);
        assert!(!definitions_present(&missing));
    }
}
