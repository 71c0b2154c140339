use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(
    Debug,
    strum::EnumIter,
    strum::EnumCount,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub enum AccessKind {
    GLOBAL_ACC_R,
    GLOBAL_ACC_W,
    LOCAL_ACC_R,
    LOCAL_ACC_W,
}

impl AccessKind {
    #[must_use]
    pub fn is_write(self) -> bool {
        match self {
            AccessKind::GLOBAL_ACC_R | AccessKind::LOCAL_ACC_R => false,
            AccessKind::GLOBAL_ACC_W | AccessKind::LOCAL_ACC_W => true,
        }
    }

    #[must_use]
    pub fn is_global(self) -> bool {
        matches!(self, AccessKind::GLOBAL_ACC_R | AccessKind::GLOBAL_ACC_W)
    }
}

/// Memory access statistics.
///
/// Records the number of requests the DMA engine pushed into its memory ports.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accesses(pub HashMap<AccessKind, u64>);

impl std::ops::AddAssign for Accesses {
    fn add_assign(&mut self, other: Self) {
        for (kind, count) in other.0 {
            *self.0.entry(kind).or_insert(0) += count;
        }
    }
}

impl Accesses {
    pub fn inc(&mut self, kind: impl Into<AccessKind>, count: u64) {
        *self.0.entry(kind.into()).or_insert(0) += count;
    }

    #[must_use]
    pub fn num_accesses(&self, kind: AccessKind) -> u64 {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn num_writes(&self) -> u64 {
        self.0
            .iter()
            .filter(|(kind, _)| kind.is_write())
            .map(|(_, count)| count)
            .sum()
    }

    #[must_use]
    pub fn num_reads(&self) -> u64 {
        self.0
            .iter()
            .filter(|(kind, _)| !kind.is_write())
            .map(|(_, count)| count)
            .sum()
    }
}

impl std::fmt::Debug for Accesses {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut accesses: Vec<_> = self
            .0
            .iter()
            .filter(|(_, &count)| count > 0)
            .map(|(kind, count)| (format!("{kind:?}"), count))
            .collect();
        accesses.sort_by_key(|(key, _)| key.clone());

        let mut out = f.debug_struct("Accesses");
        for (key, count) in accesses {
            out.field(&key, count);
        }
        out.finish_non_exhaustive()
    }
}

impl std::ops::Deref for Accesses {
    type Target = HashMap<AccessKind, u64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
