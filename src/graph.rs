//! Dependency Graph
//!
//! Static table of which domains embed which. When a domain changes, every
//! domain listed for it holds collections that must be dropped too.
//!
//! Traversal is one hop: only the direct dependents of the changed domain are
//! invalidated, never their dependents in turn. This bounds the blast radius
//! of a single change even if the table ever gains a cycle.

use crate::keys::Domain;

/// Domains whose cached entries embed `domain` and must be invalidated with it.
pub const fn dependents(domain: Domain) -> &'static [Domain] {
    match domain {
        Domain::Event => &[Domain::EventCurrent, Domain::PlayerStat],
        Domain::Phase => &[Domain::Standing],
        Domain::Team => &[Domain::Player, Domain::Standing],
        Domain::Player => &[Domain::PlayerValue, Domain::PlayerStat],
        Domain::EventCurrent | Domain::Standing | Domain::PlayerValue | Domain::PlayerStat => &[],
    }
}

/// Every edge in the graph as `(source, dependents)`.
pub fn edges() -> impl Iterator<Item = (Domain, &'static [Domain])> {
    Domain::ALL
        .into_iter()
        .map(|domain| (domain, dependents(domain)))
        .filter(|(_, deps)| !deps.is_empty())
}
