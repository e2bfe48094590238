//! Operator-supplied transform hooks.
//!
//! Hooks are a typed capability passed into the mutator: at most one
//! whole-specification hook plus any number of per-file hooks keyed by path.
//! A hook sees only the JSON it transforms.
//!
//! # Hooks file
//!
//! ```yaml
//! spec: [node, rewrite-spec.js]
//! files:
//!   package.json: [node, bump-deps.js]
//! ```
//!
//! Each command reads JSON on stdin and prints the replacement JSON on
//! stdout. Commands run from the hooks file's directory.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use flotilla_core::InstanceSpec;

use crate::error::HookError;

/// A pure JSON → JSON rewrite. `Ok(None)` means the hook returned nothing.
pub trait Transform: Send + Sync {
    fn transform(&self, input: Value) -> Result<Option<Value>, HookError>;
}

/// What a hook is applied to, resolved once when hooks are loaded.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum HookTarget {
    WholeSpec,
    NamedFile(String),
}

impl fmt::Display for HookTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookTarget::WholeSpec => f.write_str("specification"),
            HookTarget::NamedFile(path) => f.write_str(path),
        }
    }
}

/// Closure-backed hook.
pub struct FnHook<F>(pub F);

impl<F> Transform for FnHook<F>
where
    F: Fn(Value) -> Result<Option<Value>, HookError> + Send + Sync,
{
    fn transform(&self, input: Value) -> Result<Option<Value>, HookError> {
        (self.0)(input)
    }
}

/// Runs an external program: JSON in on stdin, JSON out on stdout.
#[derive(Debug, Clone)]
pub struct CommandHook {
    program: PathBuf,
    args: Vec<String>,
    dir: Option<PathBuf>,
}

impl CommandHook {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            dir: None,
        }
    }

    /// Run from `dir`; a relative program path containing a separator is
    /// resolved against it too.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if self.program.is_relative() && self.program.components().count() > 1 {
            self.program = dir.join(&self.program);
        }
        self.dir = Some(dir);
        self
    }

    fn describe(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Transform for CommandHook {
    fn transform(&self, input: Value) -> Result<Option<Value>, HookError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }
        let mut child = command.spawn().map_err(|source| HookError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;

        let payload = serde_json::to_vec(&input)?;
        let stdin = child.stdin.take();
        // stdout is drained while stdin is written so neither pipe can fill.
        let (written, output) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                Some(mut stdin) => stdin.write_all(&payload),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            (written, output)
        });
        let output = output.map_err(|e| HookError::Failed {
            hook: self.describe(),
            message: e.to_string(),
        })?;
        // A hook may exit without reading its input.
        match written {
            Err(e) if e.kind() != ErrorKind::BrokenPipe => {
                return Err(HookError::Failed {
                    hook: self.describe(),
                    message: format!("writing stdin: {e}"),
                });
            }
            _ => {}
        }

        if !output.status.success() {
            return Err(HookError::Failed {
                hook: self.describe(),
                message: format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&stdout)
            .map(Some)
            .map_err(|e| HookError::Failed {
                hook: self.describe(),
                message: format!("printed invalid JSON: {e}"),
            })
    }
}

// ---------------------------------------------------------------------------
// TransformHooks
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct TransformHooks {
    whole_spec: Option<Arc<dyn Transform>>,
    per_file: BTreeMap<String, Arc<dyn Transform>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HooksFile {
    #[serde(default)]
    spec: Option<Vec<String>>,
    #[serde(default)]
    files: BTreeMap<String, Vec<String>>,
}

impl TransformHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, target: HookTarget, hook: Arc<dyn Transform>) -> Self {
        match target {
            HookTarget::WholeSpec => self.whole_spec = Some(hook),
            HookTarget::NamedFile(path) => {
                self.per_file.insert(path, hook);
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.whole_spec.is_none() && self.per_file.is_empty()
    }

    pub fn targets(&self) -> Vec<HookTarget> {
        self.whole_spec
            .iter()
            .map(|_| HookTarget::WholeSpec)
            .chain(self.per_file.keys().cloned().map(HookTarget::NamedFile))
            .collect()
    }

    /// Load command hooks from a YAML hooks file.
    pub fn load(path: &Path) -> Result<Self, HookError> {
        let contents = std::fs::read_to_string(path).map_err(|source| HookError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: HooksFile =
            serde_yaml::from_str(&contents).map_err(|source| HookError::Load {
                path: path.to_path_buf(),
                source,
            })?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut hooks = Self::new();
        if let Some(command) = file.spec {
            let hook = command_hook(&HookTarget::WholeSpec, command, &dir)?;
            hooks = hooks.with(HookTarget::WholeSpec, Arc::new(hook));
        }
        for (name, command) in file.files {
            let target = HookTarget::NamedFile(name);
            let hook = command_hook(&target, command, &dir)?;
            hooks = hooks.with(target, Arc::new(hook));
        }
        Ok(hooks)
    }

    /// Run the whole-spec hook, then each per-file hook on files that exist.
    pub fn run(&self, spec: InstanceSpec) -> Result<InstanceSpec, HookError> {
        let mut spec = match &self.whole_spec {
            Some(hook) => {
                let value = serde_json::to_value(&spec)?;
                let replaced = hook.transform(value)?.ok_or(HookError::NoSpecification)?;
                serde_json::from_value(replaced)?
            }
            None => spec,
        };

        for (path, hook) in &self.per_file {
            let Some(content) = spec.files().get(path) else {
                continue;
            };
            let parsed: Value =
                serde_json::from_str(content).map_err(|source| HookError::Parse {
                    path: path.clone(),
                    source,
                })?;
            let replaced = hook
                .transform(parsed)?
                .ok_or_else(|| HookError::NoContent { path: path.clone() })?;
            let rendered = serde_json::to_string_pretty(&replaced)?;
            spec.files_mut().insert(path.clone(), rendered);
        }
        Ok(spec)
    }
}

impl fmt::Debug for TransformHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformHooks")
            .field("targets", &self.targets())
            .finish()
    }
}

fn command_hook(
    target: &HookTarget,
    mut command: Vec<String>,
    dir: &Path,
) -> Result<CommandHook, HookError> {
    if command.is_empty() {
        return Err(HookError::EmptyCommand {
            target: target.to_string(),
        });
    }
    let program = command.remove(0);
    Ok(CommandHook::new(program, command).in_dir(dir))
}
