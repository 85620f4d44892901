//! Capability vocabulary for prompt-to-specialist routing.
//!
//! A capability is "required" by a prompt when any of its keywords appears
//! (case-insensitive substring) in the prompt. Iteration order is definition
//! order, which makes capability inference deterministic.

/// The capability id → keyword table, in definition order.
pub fn capability_keywords() -> Vec<(&'static str, Vec<&'static str>)> {
    vec![
        (
            "code_execution",
            vec![
                "code", "script", "implement", "build", "compile", "debug", "refactor",
                "program",
            ],
        ),
        (
            "software_testing",
            vec!["test suite", "unit test", "pytest", "run tests", "test coverage"],
        ),
        (
            "file_io",
            vec!["write a file", "save to", "create a file", "read the file"],
        ),
        (
            "systematic_review",
            vec![
                "literature", "systematic review", "survey", "papers", "arxiv",
                "state of the art",
            ],
        ),
        (
            "web_search",
            vec!["search the web", "web search", "look up", "find sources", "latest news"],
        ),
        (
            "citation_extraction",
            vec!["citation", "citations", "bibliography", "references"],
        ),
        (
            "enterprise_search",
            vec!["confluence", "jira", "internal docs", "knowledge base", "wiki"],
        ),
        (
            "github_search",
            vec!["github", "repository", "pull request", "open issues"],
        ),
    ]
}

/// Capability ids known to the router.
pub fn capability_ids() -> Vec<&'static str> {
    capability_keywords().into_iter().map(|(id, _)| id).collect()
}
