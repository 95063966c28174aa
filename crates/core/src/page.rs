//! Per-page state
//!
//! A [`Page`] collects everything belonging to one page of the open
//! document: geometry, the lazily materialized text layer, annotations,
//! form fields, an optional presentation transition, and the bookmark
//! flag. Pages are owned exclusively by the document; mutation goes
//! through the façade so cache invalidation stays coupled to edits.

use vellum_generator::{PageGeometry, Rotation, TextLayer};

use crate::annotation::{Annotation, AnnotationId};
use crate::form::{FieldValue, FormField, FormFieldId};

/// How a page replaces the previous one in presentation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionStyle {
    Replace,
    Blinds,
    Box,
    Wipe,
    Dissolve,
    Glitter,
    Fly,
    Push,
    Cover,
    Uncover,
    Fade,
}

/// Presentation transition attached to a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTransition {
    pub style: TransitionStyle,
    pub duration_ms: u32,
}

/// One page of the open document.
#[derive(Debug, Clone)]
pub struct Page {
    index: usize,
    width_pt: f64,
    height_pt: f64,
    rotation: Rotation,
    text_layer: Option<TextLayer>,
    annotations: Vec<Annotation>,
    form_fields: Vec<FormField>,
    transition: Option<PageTransition>,
    bookmarked: bool,
}

impl Page {
    pub fn new(geometry: &PageGeometry) -> Self {
        Self {
            index: geometry.index,
            width_pt: geometry.width_pt,
            height_pt: geometry.height_pt,
            rotation: geometry.rotation,
            text_layer: None,
            annotations: Vec::new(),
            form_fields: Vec::new(),
            transition: None,
            bookmarked: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Width in document units (points), before rotation.
    pub fn width_pt(&self) -> f64 {
        self.width_pt
    }

    pub fn height_pt(&self) -> f64 {
        self.height_pt
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Height over width, accounting for rotation.
    pub fn ratio(&self) -> f64 {
        if self.rotation.is_sideways() {
            self.width_pt / self.height_pt
        } else {
            self.height_pt / self.width_pt
        }
    }

    pub(crate) fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }

    pub fn bookmarked(&self) -> bool {
        self.bookmarked
    }

    pub(crate) fn set_bookmarked(&mut self, bookmarked: bool) {
        self.bookmarked = bookmarked;
    }

    pub fn text_layer(&self) -> Option<&TextLayer> {
        self.text_layer.as_ref()
    }

    pub fn has_text_layer(&self) -> bool {
        self.text_layer.is_some()
    }

    pub(crate) fn set_text_layer(&mut self, layer: TextLayer) {
        self.text_layer = Some(layer);
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn annotation(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    pub(crate) fn annotation_mut(&mut self, id: AnnotationId) -> Option<&mut Annotation> {
        self.annotations.iter_mut().find(|a| a.id == id)
    }

    pub(crate) fn add_annotation(&mut self, annotation: Annotation) {
        self.annotations.push(annotation);
    }

    pub(crate) fn remove_annotation(&mut self, id: AnnotationId) -> Option<Annotation> {
        let index = self.annotations.iter().position(|a| a.id == id)?;
        Some(self.annotations.remove(index))
    }

    pub fn form_fields(&self) -> &[FormField] {
        &self.form_fields
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FormField> {
        self.form_fields.iter().find(|f| f.name == name)
    }

    /// Attach a field. Rejects a name already present on this page and
    /// returns the field back to the caller.
    pub(crate) fn add_form_field(&mut self, field: FormField) -> Result<(), FormField> {
        if self.field_by_name(&field.name).is_some() {
            return Err(field);
        }
        self.form_fields.push(field);
        Ok(())
    }

    pub(crate) fn set_field_value(&mut self, id: FormFieldId, value: FieldValue) -> bool {
        match self.form_fields.iter_mut().find(|f| f.id == id) {
            Some(field) if !field.read_only => {
                field.value = value;
                true
            }
            _ => false,
        }
    }

    pub fn transition(&self) -> Option<&PageTransition> {
        self.transition.as_ref()
    }

    pub(crate) fn set_transition(&mut self, transition: Option<PageTransition>) {
        self.transition = transition;
    }
}
