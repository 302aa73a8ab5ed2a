//! `CalDAV` filter tree (RFC 4791 §9.7).

use crate::rfc::ical::core::{ComponentKind, PropertyName};

pub use crate::rfc::ical::expand::TimeRange;

/// A node of a calendar-query filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    /// `comp-filter`
    Component(ComponentFilter),
    /// `prop-filter`
    Property(PropertyFilter),
    /// `time-range`
    TimeRange(TimeRange),
}

/// Component filter.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentFilter {
    /// Component name.
    pub name: String,
    /// Is-not-defined test.
    pub is_not_defined: bool,
    /// Nested filters, all of which must match.
    pub children: Vec<FilterNode>,
}

impl ComponentFilter {
    /// Creates a filter for a component.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_not_defined: false,
            children: Vec::new(),
        }
    }

    /// Creates the root filter for VCALENDAR.
    #[must_use]
    pub fn vcalendar() -> Self {
        Self::new("VCALENDAR")
    }

    /// Sets is-not-defined.
    #[must_use]
    pub fn not_defined(mut self) -> Self {
        self.is_not_defined = true;
        self
    }

    /// Adds a time range.
    #[must_use]
    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.children.push(FilterNode::TimeRange(range));
        self
    }

    /// Adds a property filter.
    #[must_use]
    pub fn with_prop_filter(mut self, filter: PropertyFilter) -> Self {
        self.children.push(FilterNode::Property(filter));
        self
    }

    /// Adds a nested component filter.
    #[must_use]
    pub fn with_comp_filter(mut self, filter: ComponentFilter) -> Self {
        self.children.push(FilterNode::Component(filter));
        self
    }

    /// Returns the component kind this filter names.
    #[must_use]
    pub fn kind(&self) -> ComponentKind {
        ComponentKind::parse(&self.name)
    }

    /// Returns the time ranges among the children.
    pub fn time_ranges(&self) -> impl Iterator<Item = &TimeRange> {
        self.children.iter().filter_map(|node| match node {
            FilterNode::TimeRange(range) => Some(range),
            FilterNode::Component(_) | FilterNode::Property(_) => None,
        })
    }

    /// Returns the first time range, if any.
    #[must_use]
    pub fn time_range(&self) -> Option<&TimeRange> {
        self.time_ranges().next()
    }

    /// Returns the property filters among the children.
    pub fn prop_filters(&self) -> impl Iterator<Item = &PropertyFilter> {
        self.children.iter().filter_map(|node| match node {
            FilterNode::Property(filter) => Some(filter),
            FilterNode::Component(_) | FilterNode::TimeRange(_) => None,
        })
    }

    /// Returns the component filters among the children.
    pub fn comp_filters(&self) -> impl Iterator<Item = &ComponentFilter> {
        self.children.iter().filter_map(|node| match node {
            FilterNode::Component(filter) => Some(filter),
            FilterNode::Property(_) | FilterNode::TimeRange(_) => None,
        })
    }

    /// ## Summary
    /// Returns the first time range anywhere in this filter tree.
    ///
    /// Used to decide whether results are time-range limited.
    #[must_use]
    pub fn find_time_range(&self) -> Option<&TimeRange> {
        self.time_range()
            .or_else(|| self.comp_filters().find_map(ComponentFilter::find_time_range))
    }

    /// Returns every text match in this filter tree.
    #[must_use]
    pub fn text_matches(&self) -> Vec<&TextMatch> {
        let mut found = Vec::new();
        for prop in self.prop_filters() {
            found.extend(prop.text_match.as_ref());
            found.extend(prop.param_filters.iter().filter_map(|p| p.text_match.as_ref()));
        }
        for comp in self.comp_filters() {
            found.extend(comp.text_matches());
        }
        found
    }
}

/// Property filter for queries.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyFilter {
    /// Property name.
    pub name: String,
    /// Is-not-defined test.
    pub is_not_defined: bool,
    /// Text match filter.
    pub text_match: Option<TextMatch>,
    /// Time range filter (for date properties).
    pub time_range: Option<TimeRange>,
    /// Parameter filters.
    pub param_filters: Vec<ParamFilter>,
}

impl PropertyFilter {
    /// Creates a property filter.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_not_defined: false,
            text_match: None,
            time_range: None,
            param_filters: Vec::new(),
        }
    }

    /// Sets is-not-defined test.
    #[must_use]
    pub fn not_defined(mut self) -> Self {
        self.is_not_defined = true;
        self
    }

    /// Sets text match.
    #[must_use]
    pub fn with_text_match(mut self, text_match: TextMatch) -> Self {
        self.text_match = Some(text_match);
        self
    }

    /// Sets time range.
    #[must_use]
    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    /// Adds a parameter filter.
    #[must_use]
    pub fn with_param_filter(mut self, filter: ParamFilter) -> Self {
        self.param_filters.push(filter);
        self
    }

    /// Returns the typed property name.
    #[must_use]
    pub fn property_name(&self) -> PropertyName {
        PropertyName::parse(&self.name)
    }
}

/// Parameter filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamFilter {
    /// Parameter name.
    pub name: String,
    /// Is-not-defined test.
    pub is_not_defined: bool,
    /// Text match.
    pub text_match: Option<TextMatch>,
}

impl ParamFilter {
    /// Creates a parameter filter.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_not_defined: false,
            text_match: None,
        }
    }

    /// Sets is-not-defined test.
    #[must_use]
    pub fn not_defined(mut self) -> Self {
        self.is_not_defined = true;
        self
    }

    /// Sets text match.
    #[must_use]
    pub fn with_text_match(mut self, text_match: TextMatch) -> Self {
        self.text_match = Some(text_match);
        self
    }
}

/// Text matching criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMatch {
    /// The text to match.
    pub value: String,
    /// Collation to use.
    pub collation: Option<String>,
    /// Match type.
    pub match_type: MatchType,
    /// Negate the match.
    pub negate: bool,
}

impl TextMatch {
    fn with_type(value: impl Into<String>, match_type: MatchType) -> Self {
        Self {
            value: value.into(),
            collation: None,
            match_type,
            negate: false,
        }
    }

    /// Creates a contains match.
    #[must_use]
    pub fn contains(value: impl Into<String>) -> Self {
        Self::with_type(value, MatchType::Contains)
    }

    /// Creates an equals match.
    #[must_use]
    pub fn equals(value: impl Into<String>) -> Self {
        Self::with_type(value, MatchType::Equals)
    }

    /// Creates a starts-with match.
    #[must_use]
    pub fn starts_with(value: impl Into<String>) -> Self {
        Self::with_type(value, MatchType::StartsWith)
    }

    /// Creates an ends-with match.
    #[must_use]
    pub fn ends_with(value: impl Into<String>) -> Self {
        Self::with_type(value, MatchType::EndsWith)
    }

    /// Negates the match.
    #[must_use]
    pub fn negate(mut self) -> Self {
        self.negate = true;
        self
    }

    /// Sets collation.
    #[must_use]
    pub fn with_collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = Some(collation.into());
        self
    }
}

/// Match type for text matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchType {
    /// Contains the text.
    #[default]
    Contains,
    /// Equals the text.
    Equals,
    /// Starts with the text.
    StartsWith,
    /// Ends with the text.
    EndsWith,
}

impl MatchType {
    /// Parses a `match-type` attribute value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "contains" => Some(Self::Contains),
            "equals" => Some(Self::Equals),
            "starts-with" => Some(Self::StartsWith),
            "ends-with" => Some(Self::EndsWith),
            _ => None,
        }
    }
}
