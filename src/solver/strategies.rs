use std::fmt;

use tracing::warn;

/// How the first (usually greedy) solution is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirstSolutionStrategy {
    Automatic,
    PathCheapestArc,
    Savings,
    ParallelCheapestInsertion,
    GlobalCheapestArc,
    BestInsertion,
    Sweep,
}

impl FirstSolutionStrategy {
    pub fn parse(name: &str) -> Option<FirstSolutionStrategy> {
        match name.trim().to_ascii_uppercase().as_str() {
            "AUTOMATIC" => Some(FirstSolutionStrategy::Automatic),
            "PATH_CHEAPEST_ARC" => Some(FirstSolutionStrategy::PathCheapestArc),
            "SAVINGS" => Some(FirstSolutionStrategy::Savings),
            "PARALLEL_CHEAPEST_INSERTION" => Some(FirstSolutionStrategy::ParallelCheapestInsertion),
            "GLOBAL_CHEAPEST_ARC" => Some(FirstSolutionStrategy::GlobalCheapestArc),
            "BEST_INSERTION" => Some(FirstSolutionStrategy::BestInsertion),
            "SWEEP" => Some(FirstSolutionStrategy::Sweep),
            _ => None,
        }
    }

    /// Parse with a logged fallback for unknown names.
    pub fn parse_or_default(name: &str) -> FirstSolutionStrategy {
        FirstSolutionStrategy::parse(name).unwrap_or_else(|| {
            warn!("Unknown first solution strategy '{name}', using AUTOMATIC");
            FirstSolutionStrategy::Automatic
        })
    }
}

impl fmt::Display for FirstSolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FirstSolutionStrategy::Automatic => "AUTOMATIC",
            FirstSolutionStrategy::PathCheapestArc => "PATH_CHEAPEST_ARC",
            FirstSolutionStrategy::Savings => "SAVINGS",
            FirstSolutionStrategy::ParallelCheapestInsertion => "PARALLEL_CHEAPEST_INSERTION",
            FirstSolutionStrategy::GlobalCheapestArc => "GLOBAL_CHEAPEST_ARC",
            FirstSolutionStrategy::BestInsertion => "BEST_INSERTION",
            FirstSolutionStrategy::Sweep => "SWEEP",
        };
        f.write_str(name)
    }
}

/// Local-search metaheuristic refining the first solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metaheuristic {
    Automatic,
    GuidedLocalSearch,
    TabuSearch,
    SimulatedAnnealing,
}

impl Metaheuristic {
    pub fn parse(name: &str) -> Option<Metaheuristic> {
        match name.trim().to_ascii_uppercase().as_str() {
            "AUTOMATIC" => Some(Metaheuristic::Automatic),
            "GUIDED_LOCAL_SEARCH" => Some(Metaheuristic::GuidedLocalSearch),
            "TABU_SEARCH" => Some(Metaheuristic::TabuSearch),
            "SIMULATED_ANNEALING" => Some(Metaheuristic::SimulatedAnnealing),
            _ => None,
        }
    }

    pub fn parse_or_default(name: &str) -> Metaheuristic {
        Metaheuristic::parse(name).unwrap_or_else(|| {
            warn!("Unknown metaheuristic '{name}', using AUTOMATIC");
            Metaheuristic::Automatic
        })
    }
}

impl fmt::Display for Metaheuristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metaheuristic::Automatic => "AUTOMATIC",
            Metaheuristic::GuidedLocalSearch => "GUIDED_LOCAL_SEARCH",
            Metaheuristic::TabuSearch => "TABU_SEARCH",
            Metaheuristic::SimulatedAnnealing => "SIMULATED_ANNEALING",
        };
        f.write_str(name)
    }
}

/// One racing worker's search configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrategyPair {
    pub first_solution: FirstSolutionStrategy,
    pub metaheuristic: Metaheuristic,
}

impl fmt::Display for StrategyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.first_solution, self.metaheuristic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names_case_insensitively() {
        assert_eq!(
            FirstSolutionStrategy::parse("path_cheapest_arc"),
            Some(FirstSolutionStrategy::PathCheapestArc)
        );
        assert_eq!(
            Metaheuristic::parse(" GUIDED_LOCAL_SEARCH "),
            Some(Metaheuristic::GuidedLocalSearch)
        );
    }

    #[test]
    fn unknown_names_fall_back_to_automatic() {
        assert_eq!(
            FirstSolutionStrategy::parse_or_default("NOT_A_STRATEGY"),
            FirstSolutionStrategy::Automatic
        );
        assert_eq!(Metaheuristic::parse("NOPE"), None);
    }

    #[test]
    fn display_round_trips() {
        let pair = StrategyPair {
            first_solution: FirstSolutionStrategy::Savings,
            metaheuristic: Metaheuristic::TabuSearch,
        };
        assert_eq!(pair.to_string(), "SAVINGS+TABU_SEARCH");
    }
}
