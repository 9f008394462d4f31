use crate::constants::constants;
use crate::error::RequestError;
use crate::protocol::{ContentType, SearchContext, SearchCriteria, SearchRequest, XmlOptions};
use std::collections::BTreeSet;

/// Which kind of scope the user picked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContextType {
    #[default]
    SingleResource,
    ResourceWithDependencies,
    Directory,
}

/// Raw scope inputs as a search form holds them.
///
/// Every field is present regardless of the selected [`ContextType`]; the
/// ones that do not apply are ignored when the request is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeForm {
    pub context_type: ContextType,
    pub resource_id: Option<String>,
    pub explicit_only: bool,
    pub directory_id: Option<String>,
    pub recursive: bool,
}

/// Raw criteria inputs as a search form holds them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CriteriaForm {
    pub pattern: String,
    pub is_regex: bool,
    pub case_sensitive: bool,
    pub whole_words_only: bool,
    pub ignore_whitespace: bool,
    pub dot_matches_all: bool,
    pub canonical_equivalence: bool,
    pub xml_aware: bool,
    pub content_types: BTreeSet<ContentType>,
    pub xpath_restriction: String,
}

/// Map form state to an interactive search request.
///
/// `maxResults` is always the interactive cap. Fails only when the pattern is
/// empty or the selected scope has no id.
pub fn build_search_request(
    criteria: &CriteriaForm,
    scope: &ScopeForm,
) -> Result<SearchRequest, RequestError> {
    SearchRequest::new(
        build_context(scope)?,
        build_criteria(criteria),
        Some(constants::INTERACTIVE_MAX_RESULTS),
    )
}

/// Map form state to a CSV export request, which carries no result cap.
pub fn build_export_request(
    criteria: &CriteriaForm,
    scope: &ScopeForm,
) -> Result<SearchRequest, RequestError> {
    SearchRequest::new(build_context(scope)?, build_criteria(criteria), None)
}

fn build_context(scope: &ScopeForm) -> Result<SearchContext, RequestError> {
    let required = |id: &Option<String>, what: &'static str| {
        id.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or(RequestError::MissingScopeId(what))
    };

    Ok(match scope.context_type {
        ContextType::SingleResource => SearchContext::SingleResource {
            resource_id: required(&scope.resource_id, "resource id")?,
        },
        ContextType::ResourceWithDependencies => SearchContext::ResourceWithDependencies {
            resource_id: required(&scope.resource_id, "resource id")?,
            explicit_only: scope.explicit_only,
        },
        ContextType::Directory => SearchContext::DirectoryScope {
            directory_id: required(&scope.directory_id, "directory id")?,
            recursive: scope.recursive,
        },
    })
}

fn build_criteria(form: &CriteriaForm) -> SearchCriteria {
    let xpath = form.xpath_restriction.trim();
    let xml_options = if form.content_types.is_empty() && xpath.is_empty() {
        None
    } else {
        Some(XmlOptions {
            content_types: form.content_types.clone(),
            xpath_restriction: (!xpath.is_empty()).then(|| xpath.to_string()),
        })
    };

    SearchCriteria {
        pattern: form.pattern.clone(),
        is_regex: form.is_regex,
        case_sensitive: form.case_sensitive,
        whole_words_only: form.whole_words_only,
        ignore_whitespace: form.ignore_whitespace,
        dot_matches_all: form.dot_matches_all,
        canonical_equivalence: form.canonical_equivalence,
        xml_aware: form.xml_aware,
        xml_options,
    }
}
