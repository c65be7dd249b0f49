//! Route gate deciding which requests are traced.
//!
//! A [`RouteFilter`] holds an ignore list of [`RouteRule`]s. A request is
//! traced unless some rule matches both its method and its route template.
//!
//! ```
//! use actiontrail::RouteFilter;
//!
//! let filter = RouteFilter::builtin();
//! assert!(!filter.should_trace("GET", "/{projectId}/sessions/search2"));
//! assert!(filter.should_trace("PUT", "/projects/{id}/settings"));
//! ```

use crate::error::Result;
use regex::Regex;
use std::sync::OnceLock;

/// HTTP methods a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodSet {
    /// Every method.
    Any,
    /// Only the listed methods (ASCII case-insensitive).
    Only(Vec<String>),
}

impl MethodSet {
    pub fn only(methods: impl IntoIterator<Item = impl Into<String>>) -> Self {
        MethodSet::Only(methods.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, method: &str) -> bool {
        match self {
            MethodSet::Any => true,
            MethodSet::Only(methods) => methods.iter().any(|m| m.eq_ignore_ascii_case(method)),
        }
    }
}

/// How a rule compares against a route template.
#[derive(Debug, Clone)]
pub enum RouteMatcher {
    /// Whole-string equality.
    Exact(String),
    /// Regex search anywhere in the template.
    Pattern(Regex),
}

impl RouteMatcher {
    pub fn matches(&self, path_format: &str) -> bool {
        match self {
            RouteMatcher::Exact(path) => path == path_format,
            RouteMatcher::Pattern(regex) => regex.is_match(path_format),
        }
    }
}

/// One entry of the ignore list.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub methods: MethodSet,
    pub path_matcher: RouteMatcher,
}

impl RouteRule {
    pub fn exact(methods: MethodSet, path: impl Into<String>) -> Self {
        Self {
            methods,
            path_matcher: RouteMatcher::Exact(path.into()),
        }
    }

    /// Build a pattern rule. Literal braces must be escaped (`\{projectId\}`).
    pub fn pattern(methods: MethodSet, pattern: &str) -> Result<Self> {
        Ok(Self {
            methods,
            path_matcher: RouteMatcher::Pattern(Regex::new(pattern)?),
        })
    }

    pub fn matches(&self, method: &str, path_format: &str) -> bool {
        self.methods.contains(method) && self.path_matcher.matches(path_format)
    }
}

enum Builtin {
    Exact(&'static str),
    Pattern(&'static str),
}

const ANY: &[&str] = &[];
const GET: &[&str] = &["GET"];
const POST: &[&str] = &["POST"];

// An empty method list means "any method".
const BUILTIN_RULES: &[(&[&str], Builtin)] = &[
    (ANY, Builtin::Exact("/notifications")),
    (ANY, Builtin::Exact("/announcements")),
    (ANY, Builtin::Exact("/client")),
    (ANY, Builtin::Exact("/account")),
    (GET, Builtin::Exact("/projects")),
    (ANY, Builtin::Exact("/{projectId}/sessions/search2")),
    (GET, Builtin::Exact("/{projectId}/sessions2/favorite")),
    (GET, Builtin::Pattern(r"^/\{projectId\}/sessions2/\{sessionId\}/.*")),
    (GET, Builtin::Exact("/{projectId}/sample_rate")),
    (GET, Builtin::Exact("/boarding")),
    (GET, Builtin::Exact("/{projectId}/metadata")),
    (GET, Builtin::Exact("/{projectId}/integration/sources")),
    (GET, Builtin::Exact("/{projectId}/funnels")),
    (GET, Builtin::Exact("/integrations/slack/channels")),
    (GET, Builtin::Exact("/webhooks")),
    (GET, Builtin::Exact("/{projectId}/alerts")),
    (GET, Builtin::Exact("/client/members")),
    (GET, Builtin::Exact("/client/roles")),
    (GET, Builtin::Exact("/announcements/view")),
    (GET, Builtin::Exact("/config/weekly_report")),
    (GET, Builtin::Exact("/{projectId}/events/search")),
    (POST, Builtin::Exact("/{projectId}/errors/search")),
    (GET, Builtin::Exact("/{projectId}/errors/stats")),
    (GET, Builtin::Pattern(r"^/\{projectId\}/errors/\{errorId\}/.*")),
    (GET, Builtin::Pattern(r"^/integrations/.*")),
    (ANY, Builtin::Pattern(r"^/\{projectId\}/dashboard/.*")),
    (ANY, Builtin::Pattern(r"^/\{projectId\}/funnels$")),
    (ANY, Builtin::Pattern(r"^/\{projectId\}/funnels/.*")),
];

static BUILTIN: OnceLock<Vec<RouteRule>> = OnceLock::new();

fn builtin_rules() -> &'static [RouteRule] {
    BUILTIN.get_or_init(|| {
        BUILTIN_RULES
            .iter()
            .filter_map(|(methods, matcher)| {
                let methods = if methods.is_empty() {
                    MethodSet::Any
                } else {
                    MethodSet::only(methods.iter().copied())
                };
                let path_matcher = match matcher {
                    Builtin::Exact(path) => RouteMatcher::Exact(path.to_string()),
                    Builtin::Pattern(pattern) => match Regex::new(pattern) {
                        Ok(regex) => RouteMatcher::Pattern(regex),
                        Err(e) => {
                            tracing::error!(pattern, error = %e, "Skipping built-in route rule");
                            return None;
                        }
                    },
                };
                Some(RouteRule {
                    methods,
                    path_matcher,
                })
            })
            .collect()
    })
}

/// Ordered, immutable ignore list.
#[derive(Debug, Clone)]
pub struct RouteFilter {
    rules: Vec<RouteRule>,
}

impl RouteFilter {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self { rules }
    }

    /// A filter that traces everything.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// The built-in ignore list for noisy read-only and polling routes.
    ///
    /// The table is compiled once per process and shared by every filter.
    pub fn builtin() -> Self {
        Self {
            rules: builtin_rules().to_vec(),
        }
    }

    /// Append a rule.
    pub fn with_rule(mut self, rule: RouteRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// `false` when any rule matches, `true` otherwise.
    pub fn should_trace(&self, method: &str, path_format: &str) -> bool {
        !self
            .rules
            .iter()
            .any(|rule| rule.matches(method, path_format))
    }
}

impl Default for RouteFilter {
    fn default() -> Self {
        Self::builtin()
    }
}
