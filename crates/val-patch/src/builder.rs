//! Building operations from module and source paths.

use serde_json::Value;
use val_path::{ModuleFilePath, ModulePath, PatchPath, Segment, SourcePath};
use val_schema::SchemaKind;

use crate::types::{Op, PatchError};

/// Patch path of a module path. Module paths are validated on construction,
/// so this cannot fail.
pub fn module_patch_path(module_path: &ModulePath) -> PatchPath {
    module_path.segments().iter().map(Segment::to_raw).collect()
}

/// Module file path and patch path of a combined address.
///
/// # Example
///
/// ```
/// use val_path::SourcePath;
/// use val_patch::patch_path_of;
///
/// let source = SourcePath::new(r#"/content/blog.val.ts?p="posts".0."title""#).unwrap();
/// let (module, path) = patch_path_of(&source);
/// assert_eq!(module.as_str(), "/content/blog.val.ts");
/// assert_eq!(path, vec!["posts", "0", "title"]);
/// ```
pub fn patch_path_of(source_path: &SourcePath) -> (ModuleFilePath, PatchPath) {
    let (module, module_path) = source_path.split();
    (module, module_patch_path(&module_path))
}

/// Accumulates operations against a single module.
#[derive(Debug, Clone)]
pub struct PatchBuilder {
    module: ModuleFilePath,
    ops: Vec<Op>,
}

impl PatchBuilder {
    pub fn new(module: ModuleFilePath) -> Self {
        Self {
            module,
            ops: Vec::new(),
        }
    }

    pub fn module(&self) -> &ModuleFilePath {
        &self.module
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Module path of a combined address, rejecting other modules.
    pub fn locate(&self, source_path: &SourcePath) -> Result<ModulePath, PatchError> {
        let (module, module_path) = source_path.split();
        if module != self.module {
            return Err(PatchError::InvalidOp(format!(
                "{source_path} is not in module {}",
                self.module
            )));
        }
        Ok(module_path)
    }

    pub fn add(&mut self, at: &ModulePath, value: Value) -> &mut Self {
        self.ops.push(Op::add(module_patch_path(at), value));
        self
    }

    /// Append to the array at `array`.
    pub fn push(&mut self, array: &ModulePath, value: Value) -> &mut Self {
        let mut path = module_patch_path(array);
        path.push("-".to_string());
        self.ops.push(Op::add(path, value));
        self
    }

    pub fn remove(&mut self, at: &ModulePath) -> &mut Self {
        self.ops.push(Op::remove(module_patch_path(at)));
        self
    }

    pub fn replace(&mut self, at: &ModulePath, value: Value) -> &mut Self {
        self.ops.push(Op::replace(module_patch_path(at), value));
        self
    }

    pub fn move_to(&mut self, from: &ModulePath, to: &ModulePath) -> &mut Self {
        self.ops
            .push(Op::move_op(module_patch_path(from), module_patch_path(to)));
        self
    }

    pub fn copy_to(&mut self, from: &ModulePath, to: &ModulePath) -> &mut Self {
        self.ops
            .push(Op::copy(module_patch_path(from), module_patch_path(to)));
        self
    }

    pub fn test(&mut self, at: &ModulePath, value: Value) -> &mut Self {
        self.ops.push(Op::test(module_patch_path(at), value));
        self
    }

    /// Inline file payload for a file or image node.
    pub fn file(
        &mut self,
        kind: SchemaKind,
        at: &ModulePath,
        file_path: Option<String>,
        payload: impl Into<String>,
        metadata: Option<Value>,
        remote: bool,
    ) -> Result<&mut Self, PatchError> {
        let op = Op::file(
            kind,
            module_patch_path(at),
            file_path,
            Value::String(payload.into()),
            metadata,
            remote,
        )?;
        self.ops.push(op);
        Ok(self)
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn build(self) -> (ModuleFilePath, Vec<Op>) {
        (self.module, self.ops)
    }
}
