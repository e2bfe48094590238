//! Template resolver. Produces the file set to propagate.

use std::path::{Path, PathBuf};

use flotilla_core::{
    ConfigError, FileSet, InstanceRef, InstanceSpec, SubscriptionId, METADATA_FILE,
};
use flotilla_remote::{RemoteApi, Session};

use crate::error::{io_err, SyncError};

/// Where the template comes from. Exactly one per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// A directory tree on disk, walked from `path/include`.
    Local {
        path: PathBuf,
        include: Option<String>,
    },
    /// Another function instance; only files under `include` are used.
    Remote {
        instance: InstanceRef,
        include: Option<String>,
    },
    /// No files at all; the run only applies transform hooks.
    HooksOnly,
}

impl TemplateSource {
    /// Pick the source from the operator's options.
    pub fn select(
        template: Option<InstanceRef>,
        path: Option<PathBuf>,
        include: Option<String>,
        has_hooks: bool,
    ) -> Result<Self, ConfigError> {
        match (template, path) {
            (Some(_), Some(_)) => Err(ConfigError::AmbiguousTemplateSource),
            (Some(instance), None) => Ok(TemplateSource::Remote { instance, include }),
            (None, Some(path)) => Ok(TemplateSource::Local { path, include }),
            (None, None) if has_hooks => Ok(TemplateSource::HooksOnly),
            (None, None) => Err(ConfigError::NoTemplateSource),
        }
    }
}

/// A normalized template file set plus a label naming its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTemplate {
    pub files: FileSet,
    pub label: String,
}

pub async fn resolve(
    remote: &dyn RemoteApi,
    session: &Session,
    subscription: &SubscriptionId,
    source: &TemplateSource,
    default_include: &str,
) -> Result<ResolvedTemplate, SyncError> {
    let resolved = match source {
        TemplateSource::Local { path, include } => read_local(path, include.as_deref())?,
        TemplateSource::Remote { instance, include } => {
            let spec = remote.get_function(session, subscription, instance).await?;
            let include = include.as_deref().unwrap_or(default_include);
            ResolvedTemplate {
                files: select_included(&spec, include),
                label: instance.to_string(),
            }
        }
        TemplateSource::HooksOnly => ResolvedTemplate {
            files: FileSet::new(),
            label: "(hooks only)".to_string(),
        },
    };
    tracing::info!(
        template = %resolved.label,
        files = resolved.files.len(),
        "resolved template",
    );
    Ok(resolved)
}

/// Keep files under `include`, keyed by the remainder of their path.
pub fn select_included(spec: &InstanceSpec, include: &str) -> FileSet {
    spec.files()
        .iter()
        .filter_map(|(name, content)| {
            let stripped = name.strip_prefix(include)?;
            (!stripped.is_empty()).then(|| (stripped.to_string(), content.clone()))
        })
        .collect()
}

/// Walk `path/include` depth-first and collect every visible regular file.
///
/// Dot-files and the platform metadata file are skipped. Symlinked files are
/// read; symlinked directories are not descended into. Keys are relative to the walk root with `/` separators.
pub fn read_local(path: &Path, include: Option<&str>) -> Result<ResolvedTemplate, SyncError> {
    let root = match include {
        Some(include) if !include.is_empty() => path.join(include),
        _ => path.to_path_buf(),
    };

    let mut files = FileSet::new();
    let mut dirs = vec![root.clone()];
    while let Some(dir) = dirs.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| io_err(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            let entry_path = entry.path();
            let ty = entry.file_type().map_err(|e| io_err(&entry_path, e))?;
            if ty.is_dir() {
                dirs.push(entry_path);
                continue;
            }
            let is_file = if ty.is_symlink() {
                std::fs::metadata(&entry_path)
                    .map_err(|e| io_err(&entry_path, e))?
                    .is_file()
            } else {
                ty.is_file()
            };
            if !is_file {
                tracing::debug!(path = %entry_path.display(), "skipping non-file entry");
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || name == METADATA_FILE {
                continue;
            }
            let content =
                std::fs::read_to_string(&entry_path).map_err(|e| io_err(&entry_path, e))?;
            files.insert(relative_key(&root, &entry_path), content);
        }
    }

    Ok(ResolvedTemplate {
        files,
        label: root.display().to_string(),
    })
}

fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
