use std::path::PathBuf;

use smallvec::SmallVec;

use crate::error::{ResolveError, ResolveResult};

/// Longest accepted input, matching the extended-path limit of the host
/// APIs being virtualized.
const MAX_PATH_LEN: usize = 32 * 1024;

/// A host path brought into canonical form.
///
/// Separators are unified to `/`, device prefixes (`\\?\`, `\\.\`) are
/// stripped, `.` and `..` are resolved, and empty components collapse.
/// Component case is preserved — every comparison against the virtual tree
/// and the shared tables folds case instead, so the original spelling
/// survives into emitted real paths.
#[derive(Clone, Debug)]
pub struct NormalizedPath {
    original: String,
    normalized: String,
    components: Vec<String>,
    absolute: bool,
}

impl NormalizedPath {
    pub fn parse(input: &str) -> ResolveResult<Self> {
        if input.is_empty() {
            return Err(ResolveError::invalid("normalize.empty"));
        }
        if input.len() > MAX_PATH_LEN {
            return Err(ResolveError::invalid("normalize.too_long"));
        }

        let mut unified = input.replace('\\', "/");
        // Device path prefixes carry no meaning for virtualization.
        let stripped = unified
            .strip_prefix("//?/")
            .or_else(|| unified.strip_prefix("//./"))
            .map(str::to_owned);
        if let Some(stripped) = stripped {
            unified = stripped;
        }

        let unix_rooted = unified.starts_with('/');
        let mut components: SmallVec<[&str; 16]> = SmallVec::new();
        for raw in unified.split('/') {
            match raw {
                "" | "." => {}
                ".." => match components.last() {
                    Some(&last) if last != ".." && !is_drive(last) => {
                        components.pop();
                    }
                    Some(&last) if is_drive(last) => {
                        // `..` clamps at a drive root.
                    }
                    _ if unix_rooted => {
                        // `..` clamps at the filesystem root.
                    }
                    _ => components.push(".."),
                },
                other => components.push(other),
            }
        }

        let drive_rooted = components.first().is_some_and(|first| is_drive(first));
        let absolute = unix_rooted || drive_rooted;
        if components.is_empty() && !unix_rooted {
            return Err(ResolveError::invalid("normalize.no_components"));
        }

        let mut normalized = String::with_capacity(unified.len());
        if unix_rooted {
            normalized.push('/');
        }
        for (i, comp) in components.iter().enumerate() {
            if i > 0 {
                normalized.push('/');
            }
            normalized.push_str(comp);
        }

        Ok(NormalizedPath {
            original: input.to_owned(),
            normalized,
            components: components.into_iter().map(str::to_owned).collect(),
            absolute,
        })
    }

    /// The input exactly as given.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Canonical form used as the key of the shared tables.
    pub fn as_key(&self) -> &str {
        &self.normalized
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// Canonical form as a host path.
    pub fn to_real(&self) -> PathBuf {
        PathBuf::from(&self.normalized)
    }

    /// Relative mirror of the path under an overlay root: the drive colon
    /// is dropped so `c:/game/x` becomes `c/game/x`.
    pub fn overlay_suffix(&self) -> PathBuf {
        let mut suffix = PathBuf::new();
        for comp in &self.components {
            if let Some(drive) = comp.strip_suffix(':') {
                suffix.push(drive);
            } else {
                suffix.push(comp);
            }
        }
        suffix
    }
}

fn is_drive(component: &str) -> bool {
    let bytes = component.as_bytes();
    bytes.len() == 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_collapse_and_unify() {
        let norm = NormalizedPath::parse("C:\\game\\\\data///mod.esp").unwrap();
        assert_eq!(norm.as_key(), "C:/game/data/mod.esp");
        assert_eq!(norm.components().len(), 4);
        assert!(norm.is_absolute());
    }

    #[test]
    fn device_prefix_is_stripped() {
        let norm = NormalizedPath::parse("\\\\?\\C:\\game\\data").unwrap();
        assert_eq!(norm.as_key(), "C:/game/data");
        let dot = NormalizedPath::parse("\\\\.\\C:\\game").unwrap();
        assert_eq!(dot.as_key(), "C:/game");
    }

    #[test]
    fn dots_resolve() {
        let norm = NormalizedPath::parse("C:/game/./data/../data/mod.esp").unwrap();
        assert_eq!(norm.as_key(), "C:/game/data/mod.esp");
    }

    #[test]
    fn dotdot_clamps_at_roots() {
        let drive = NormalizedPath::parse("C:/../../game").unwrap();
        assert_eq!(drive.as_key(), "C:/game");
        let rooted = NormalizedPath::parse("/../tmp").unwrap();
        assert_eq!(rooted.as_key(), "/tmp");
    }

    #[test]
    fn relative_paths_keep_leading_dotdot() {
        let rel = NormalizedPath::parse("../shared/file.txt").unwrap();
        assert_eq!(rel.as_key(), "../shared/file.txt");
        assert!(!rel.is_absolute());
    }

    #[test]
    fn empty_and_degenerate_inputs_fail() {
        assert!(NormalizedPath::parse("").is_err());
        assert!(NormalizedPath::parse("///").is_ok()); // the root itself
        assert!(NormalizedPath::parse(".").is_err());
    }

    #[test]
    fn overlay_suffix_drops_drive_colon() {
        let norm = NormalizedPath::parse("C:/game/data/new.esp").unwrap();
        assert_eq!(
            norm.overlay_suffix(),
            PathBuf::from("C/game/data/new.esp")
        );
    }

    #[test]
    fn oversized_input_is_rejected() {
        let long = format!("C:/{}", "a/".repeat(20 * 1024));
        assert!(matches!(
            NormalizedPath::parse(&long),
            Err(ResolveError::InvalidPath { .. })
        ));
    }
}
