// src/shader_patch.rs
//! Shader injection stage.
//!
//! A [`PatchSet`] is an ordered list of `(stage, marker, kind, template)`
//! entries applied to a [`ShaderSource`] before its chunks are expanded.
//! Each template wraps its marker instead of replacing it, so the standard
//! chunk behind the marker still runs.
//!
//! Applying a set is all-or-nothing. Before anything is written the set is
//! checked for:
//! - markers that are missing or appear more than once,
//! - templates that drop (or duplicate) their own marker,
//! - declaration patches placed after logic patches in the same stage,
//! - a set that was already applied to this source,
//! - a declaration at a marker an earlier set already declared at.

use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Pipeline stage a patch targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Vertex => "vertex",
            Stage::Fragment => "fragment",
        })
    }
}

/// Declarations (attributes, varyings, uniforms, helper functions) must land
/// textually before the logic that uses them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    Declaration,
    Logic,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("patch set '{set}' was already applied to this source")]
    AlreadyApplied { set: String },

    #[error("{stage} marker {marker:?} not found")]
    MarkerMissing { stage: Stage, marker: String },

    #[error("{stage} marker {marker:?} appears {count} times, expected once")]
    MarkerDuplicated { stage: Stage, marker: String, count: usize },

    #[error("template for {stage} marker {marker:?} must contain the marker exactly once")]
    TemplateDropsMarker { stage: Stage, marker: String },

    #[error("{stage} declaration at {declaration:?} comes after logic at {logic:?}")]
    DeclarationAfterLogic { stage: Stage, declaration: String, logic: String },

    #[error("{stage} marker {marker:?} already carries declarations from set '{set}'")]
    AlreadyDeclared { stage: Stage, marker: String, set: String },
}

/// One injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderPatch {
    pub stage: Stage,
    pub marker: Cow<'static, str>,
    pub kind: PatchKind,
    pub template: Cow<'static, str>,
}

impl ShaderPatch {
    pub fn declaration(
        stage: Stage,
        marker: impl Into<Cow<'static, str>>,
        template: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self { stage, marker: marker.into(), kind: PatchKind::Declaration, template: template.into() }
    }

    pub fn logic(
        stage: Stage,
        marker: impl Into<Cow<'static, str>>,
        template: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self { stage, marker: marker.into(), kind: PatchKind::Logic, template: template.into() }
    }
}

/// Marker that received declarations, and the set that put them there.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Declared {
    stage: Stage,
    marker: String,
    set: String,
}

/// Vertex + fragment text of one material program, plus the names of the
/// patch sets already applied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    vertex: String,
    fragment: String,
    applied: Vec<String>,
    declared: Vec<Declared>,
}

impl ShaderSource {
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self { vertex: vertex.into(), fragment: fragment.into(), applied: Vec::new(), declared: Vec::new() }
    }

    #[inline]
    pub fn stage(&self, stage: Stage) -> &str {
        match stage {
            Stage::Vertex => &self.vertex,
            Stage::Fragment => &self.fragment,
        }
    }

    #[inline]
    pub fn vertex(&self) -> &str {
        &self.vertex
    }

    #[inline]
    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// Names of applied patch sets, in application order.
    pub fn applied(&self) -> &[String] {
        &self.applied
    }

    #[inline]
    pub fn is_patched(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Ordered, named list of patches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchSet {
    name: Cow<'static, str>,
    patches: Vec<ShaderPatch>,
}

impl PatchSet {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self { name: name.into(), patches: Vec::new() }
    }

    pub fn with(mut self, patch: ShaderPatch) -> Self {
        self.patches.push(patch);
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn patches(&self) -> &[ShaderPatch] {
        &self.patches
    }

    /// Checks every rule against `source` without modifying it.
    pub fn validate(&self, source: &ShaderSource) -> Result<(), PatchError> {
        if source.applied.iter().any(|name| name == self.name()) {
            return Err(PatchError::AlreadyApplied { set: self.name().to_string() });
        }

        for patch in &self.patches {
            // Two sets declaring at one marker inject the same names twice.
            if patch.kind == PatchKind::Declaration {
                if let Some(d) = source.declared.iter().find(|d| d.stage == patch.stage && d.marker == patch.marker) {
                    return Err(PatchError::AlreadyDeclared {
                        stage: patch.stage,
                        marker: d.marker.clone(),
                        set: d.set.clone(),
                    });
                }
            }
            let text = source.stage(patch.stage);
            check_single(text, patch)?;
            if patch.template.matches(patch.marker.as_ref()).count() != 1 {
                return Err(PatchError::TemplateDropsMarker {
                    stage: patch.stage,
                    marker: patch.marker.to_string(),
                });
            }
        }

        for stage in [Stage::Vertex, Stage::Fragment] {
            let text = source.stage(stage);
            let position = |p: &&ShaderPatch| text.find(p.marker.as_ref()).unwrap_or(0);
            let in_stage = || self.patches.iter().filter(move |p| p.stage == stage);

            let last_declaration = in_stage().filter(|p| p.kind == PatchKind::Declaration).max_by_key(position);
            let first_logic = in_stage().filter(|p| p.kind == PatchKind::Logic).min_by_key(position);
            if let (Some(decl), Some(logic)) = (last_declaration, first_logic) {
                if position(&decl) > position(&logic) {
                    return Err(PatchError::DeclarationAfterLogic {
                        stage,
                        declaration: decl.marker.to_string(),
                        logic: logic.marker.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Validates, then applies every patch in declared order. On error the
    /// source is left untouched.
    pub fn apply(&self, source: &mut ShaderSource) -> Result<(), PatchError> {
        self.validate(source)?;

        let mut vertex = source.vertex.clone();
        let mut fragment = source.fragment.clone();
        for patch in &self.patches {
            let text = match patch.stage {
                Stage::Vertex => &mut vertex,
                Stage::Fragment => &mut fragment,
            };
            // An earlier template in this set may have introduced a second copy.
            check_single(text, patch)?;
            *text = text.replacen(patch.marker.as_ref(), &patch.template, 1);
        }

        source.vertex = vertex;
        source.fragment = fragment;
        source.applied.push(self.name().to_string());
        source.declared.extend(self.patches.iter().filter(|p| p.kind == PatchKind::Declaration).map(|p| Declared {
            stage: p.stage,
            marker: p.marker.to_string(),
            set: self.name().to_string(),
        }));
        log::debug!("applied shader patch set '{}' ({} patches)", self.name, self.patches.len());
        Ok(())
    }
}

fn check_single(text: &str, patch: &ShaderPatch) -> Result<(), PatchError> {
    match text.matches(patch.marker.as_ref()).count() {
        1 => Ok(()),
        0 => Err(PatchError::MarkerMissing { stage: patch.stage, marker: patch.marker.to_string() }),
        count => Err(PatchError::MarkerDuplicated {
            stage: patch.stage,
            marker: patch.marker.to_string(),
            count,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ShaderSource {
        ShaderSource::new(
            "#include <common>\nfn main() {\n#include <begin_vertex>\n}\n",
            "#include <common>\nfn main() {\n#include <color>\n}\n",
        )
    }

    fn set() -> PatchSet {
        PatchSet::new("test")
            .with(ShaderPatch::declaration(Stage::Vertex, "#include <common>", "#include <common>\nvar<private> y: f32;"))
            .with(ShaderPatch::logic(Stage::Vertex, "#include <begin_vertex>", "#include <begin_vertex>\n    y = 1.0;"))
            .with(ShaderPatch::logic(Stage::Fragment, "#include <color>", "    c = 2.0;\n#include <color>"))
    }

    #[test]
    fn test_apply_wraps_markers_in_order() {
        let mut src = base();
        set().apply(&mut src).unwrap();
        assert_eq!(
            src.vertex(),
            "#include <common>\nvar<private> y: f32;\nfn main() {\n#include <begin_vertex>\n    y = 1.0;\n}\n"
        );
        assert_eq!(src.fragment(), "#include <common>\nfn main() {\n    c = 2.0;\n#include <color>\n}\n");
        assert_eq!(src.applied(), &["test".to_string()]);
        assert!(src.is_patched());
    }

    #[test]
    fn test_reapplying_is_detected() {
        let mut src = base();
        set().apply(&mut src).unwrap();
        let patched = src.clone();
        let err = set().apply(&mut src).unwrap_err();
        assert_eq!(err, PatchError::AlreadyApplied { set: "test".into() });
        assert_eq!(src, patched);
    }

    #[test]
    fn test_missing_marker_leaves_source_untouched() {
        let mut src = base();
        let broken = set().with(ShaderPatch::logic(Stage::Fragment, "#include <gone>", "#include <gone>"));
        let err = broken.apply(&mut src).unwrap_err();
        assert!(matches!(err, PatchError::MarkerMissing { stage: Stage::Fragment, .. }));
        assert_eq!(src, base());
    }

    #[test]
    fn test_duplicated_marker() {
        let mut src = ShaderSource::new("#include <common>\n#include <common>\n", "");
        let patches = PatchSet::new("dup").with(ShaderPatch::declaration(Stage::Vertex, "#include <common>", "#include <common>"));
        let err = patches.apply(&mut src).unwrap_err();
        assert!(matches!(err, PatchError::MarkerDuplicated { count: 2, .. }));
    }

    #[test]
    fn test_template_must_reemit_marker() {
        let mut src = base();
        let replacing = PatchSet::new("replace").with(ShaderPatch::logic(Stage::Vertex, "#include <begin_vertex>", "y = 1.0;"));
        assert!(matches!(replacing.apply(&mut src), Err(PatchError::TemplateDropsMarker { .. })));
        assert!(!src.is_patched());
    }

    #[test]
    fn test_declaration_after_logic_is_rejected() {
        let mut src = base();
        let backwards = PatchSet::new("backwards")
            .with(ShaderPatch::declaration(Stage::Vertex, "#include <begin_vertex>", "#include <begin_vertex>\nvar<private> y: f32;"))
            .with(ShaderPatch::logic(Stage::Vertex, "#include <common>", "#include <common>\ny = 1.0;"));
        let err = backwards.apply(&mut src).unwrap_err();
        assert!(matches!(err, PatchError::DeclarationAfterLogic { stage: Stage::Vertex, .. }));
    }

    #[test]
    fn test_template_introducing_duplicate_is_caught() {
        let mut src = base();
        let sneaky = PatchSet::new("sneaky")
            .with(ShaderPatch::declaration(Stage::Vertex, "#include <common>", "#include <common>\n#include <begin_vertex>"))
            .with(ShaderPatch::logic(Stage::Vertex, "#include <begin_vertex>", "#include <begin_vertex>\n"));
        let err = sneaky.apply(&mut src).unwrap_err();
        assert!(matches!(err, PatchError::MarkerDuplicated { count: 2, .. }));
        assert_eq!(src, base());
    }

    #[test]
    fn test_second_set_cannot_redeclare_at_marker() {
        let mut src = base();
        set().apply(&mut src).unwrap();
        let patched = src.clone();
        let again = PatchSet::new("other")
            .with(ShaderPatch::declaration(Stage::Vertex, "#include <common>", "#include <common>\nvar<private> y: f32;"));
        let err = again.apply(&mut src).unwrap_err();
        assert_eq!(
            err,
            PatchError::AlreadyDeclared { stage: Stage::Vertex, marker: "#include <common>".into(), set: "test".into() }
        );
        assert_eq!(src, patched);
    }
}
