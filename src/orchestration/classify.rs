use crate::session::ProblemType;

const POPUP_MARKERS: &[&str] = &["pop-up", "popup", "pop up", "advert", "adware"];
const MARQUIS_MARKERS: &[&str] = &[
    "search marquis",
    "marquis",
    "redirect",
    "search engine changed",
    "homepage changed",
    "hijack",
];

/// Maps the free-text problem statement onto the closed problem-type set.
/// Always succeeds: a blank statement is Unclassified, anything else that
/// matches no marker is General.
pub fn classify_problem(statement: &str) -> ProblemType {
    let normalized = statement.trim().to_lowercase();
    if normalized.is_empty() {
        return ProblemType::Unclassified;
    }
    if POPUP_MARKERS.iter().any(|marker| normalized.contains(marker)) {
        return ProblemType::SuspiciousPopups;
    }
    if MARQUIS_MARKERS
        .iter()
        .any(|marker| normalized.contains(marker))
    {
        return ProblemType::SearchMarquis;
    }
    ProblemType::General
}

/// Initial goal list embedded in the first reasoning context, keyed by the
/// classified problem type.
pub fn initial_goals(problem_type: ProblemType) -> &'static str {
    match problem_type {
        ProblemType::SuspiciousPopups => {
            "Goals: inspect browser extensions, startup items, and running \
             processes for adware; scan any suspicious binaries."
        }
        ProblemType::SearchMarquis => {
            "Goals: inspect browser settings and extensions for hijackers, \
             check launch agents, and scan suspicious profile files."
        }
        ProblemType::General | ProblemType::Unclassified => {
            "Goals: survey processes, startup items, and network connections, \
             then narrow in on anything anomalous."
        }
    }
}
