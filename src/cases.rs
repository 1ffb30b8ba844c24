//! Per-build statement lists and their merging into shared `case` branches.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::variant::Bitness;

/// Statements generated for one build of one bitness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchCase {
    pub build: u32,
    pub bitness: Bitness,
    pub statements: Vec<String>,
}

/// One emitted branch: the builds sharing it, in ascending order, and its statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub builds: Vec<u32>,
    pub statements: Vec<String>,
}

/// Statements of one bitness keyed by build, kept in ascending build order.
#[derive(Debug, Clone)]
pub struct BuildCases {
    bitness: Bitness,
    cases: BTreeMap<u32, Vec<String>>,
}

impl BuildCases {
    pub fn new(bitness: Bitness) -> Self {
        Self {
            bitness,
            cases: BTreeMap::new(),
        }
    }

    pub fn bitness(&self) -> Bitness {
        self.bitness
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn contains(&self, build: u32) -> bool {
        self.cases.contains_key(&build)
    }

    /// Appends a statement to the case of `build`, creating the case if needed.
    pub fn push(&mut self, build: u32, statement: impl Into<String>) {
        self.cases.entry(build).or_default().push(statement.into());
    }

    /// Adds a case for a build that is deliberately not handled.
    ///
    /// The build must not already have statements of its own.
    pub fn insert_placeholder(&mut self, build: u32, statement: impl Into<String>) -> Result<()> {
        if self.cases.contains_key(&build) {
            return Err(Error::Precondition(format!(
                "{} build {build} already has a case and cannot be marked unsupported",
                self.bitness
            )));
        }
        self.cases.insert(build, vec![statement.into()]);
        Ok(())
    }

    pub fn cases(&self) -> impl Iterator<Item = PatchCase> + '_ {
        self.cases.iter().map(|(&build, statements)| PatchCase {
            build,
            bitness: self.bitness,
            statements: statements.clone(),
        })
    }

    /// Folds the cases into branches, merging runs of adjacent builds whose statements are
    /// identical up to whitespace.
    pub fn branches(&self) -> Vec<Branch> {
        self.cases
            .iter()
            .fold(Vec::<Branch>::new(), |mut branches, (&build, statements)| {
                match branches.last_mut() {
                    Some(open) if same_statements(&open.statements, statements) => {
                        open.builds.push(build)
                    }
                    _ => branches.push(Branch {
                        builds: vec![build],
                        statements: statements.clone(),
                    }),
                }
                branches
            })
    }
}

fn same_statements(a: &[String], b: &[String]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| x.split_whitespace().eq(y.split_whitespace()))
}
