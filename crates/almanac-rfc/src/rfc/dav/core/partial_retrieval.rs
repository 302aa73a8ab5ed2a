//! Partial retrieval data structures for calendar-data.
//!
//! RFC 4791 §9.6 (calendar-data).

/// Component selection for calendar-data partial retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentSelection {
    /// Component name (e.g., "VEVENT", "VTODO").
    pub name: String,
    /// Properties to include within this component. Empty means all.
    pub props: Vec<String>,
    /// Nested sub-components. Empty means all.
    pub comps: Vec<ComponentSelection>,
}

impl ComponentSelection {
    /// Creates a new component selection.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            props: Vec::new(),
            comps: Vec::new(),
        }
    }

    /// Adds a property to include.
    #[must_use]
    pub fn with_prop(mut self, prop: impl Into<String>) -> Self {
        self.props.push(prop.into());
        self
    }

    /// Adds a nested component.
    #[must_use]
    pub fn with_comp(mut self, comp: ComponentSelection) -> Self {
        self.comps.push(comp);
        self
    }

    /// Returns the selection for a child component, if it is selected.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&ComponentSelection> {
        self.comps.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Returns whether a property is selected.
    #[must_use]
    pub fn includes_prop(&self, name: &str) -> bool {
        self.props.is_empty() || self.props.iter().any(|p| p.eq_ignore_ascii_case(name))
    }

    /// Returns whether child components are restricted.
    #[must_use]
    pub fn restricts_comps(&self) -> bool {
        !self.comps.is_empty()
    }
}

/// Calendar-data with optional partial retrieval specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CalendarDataRequest {
    /// Component selection for partial retrieval.
    pub selection: Option<ComponentSelection>,
    /// Return matched instances rather than the stored object.
    pub expand: bool,
}

impl CalendarDataRequest {
    /// Creates a request for full calendar data (no partial retrieval).
    #[must_use]
    pub fn full() -> Self {
        Self::default()
    }

    /// Creates a request with component selection.
    #[must_use]
    pub fn with_selection(selection: ComponentSelection) -> Self {
        Self {
            selection: Some(selection),
            expand: false,
        }
    }

    /// Requests matched instances only.
    #[must_use]
    pub fn expanded(mut self) -> Self {
        self.expand = true;
        self
    }
}
