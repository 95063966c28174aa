//! Interactive form fields
//!
//! Form fields come from the source document. Their values are editable
//! through the document façade; everything else (kind, name, actions) is
//! fixed at load time.

use crate::action::Action;

/// Stable identity of a form field.
pub type FormFieldId = uuid::Uuid;

/// The closed set of field variants.
#[derive(Debug, Clone, PartialEq)]
pub enum FormFieldKind {
    Text {
        multiline: bool,
        password: bool,
        max_len: Option<usize>,
    },
    CheckBox,
    Radio {
        /// Radio buttons sharing a group toggle exclusively.
        group: String,
    },
    Choice {
        options: Vec<String>,
        editable: bool,
        multi_select: bool,
    },
    PushButton,
    Signature,
}

/// The current value of a field.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    #[default]
    Empty,
    Text(String),
    Toggle(bool),
    /// Selected option indexes of a choice field.
    Choices(Vec<usize>),
}

/// Scripted behaviors attached to a field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldActions {
    pub format: Option<Action>,
    pub validate: Option<Action>,
    pub calculate: Option<Action>,
}

/// One form field on one page.
#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub id: FormFieldId,
    /// Unique within its page; unique document-wide for kinds that
    /// aggregate values across widgets.
    pub name: String,
    pub kind: FormFieldKind,
    pub value: FieldValue,
    pub visible: bool,
    pub read_only: bool,
    pub actions: FieldActions,
}

impl FormField {
    pub fn new(name: impl Into<String>, kind: FormFieldKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            name: name.into(),
            kind,
            value: FieldValue::Empty,
            visible: true,
            read_only: false,
            actions: FieldActions::default(),
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn with_value(mut self, value: FieldValue) -> Self {
        self.value = value;
        self
    }

    pub fn with_actions(mut self, actions: FieldActions) -> Self {
        self.actions = actions;
        self
    }

    /// Whether widgets sharing this field's name share one value. Buttons
    /// and signatures never aggregate.
    pub fn aggregates_values(&self) -> bool {
        !matches!(
            self.kind,
            FormFieldKind::PushButton | FormFieldKind::Signature
        )
    }
}
