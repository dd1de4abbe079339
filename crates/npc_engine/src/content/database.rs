use std::collections::BTreeMap;

use crate::sim::{AgentKind, AgentStats};

#[derive(Debug, Clone, PartialEq)]
pub struct AgentDef {
    pub kind: AgentKind,
    pub label: String,
    pub stats: AgentStats,
    /// Mod that last touched this definition; `None` for built-ins.
    pub source_mod: Option<String>,
}

impl AgentDef {
    fn builtin(kind: AgentKind) -> Self {
        Self {
            kind,
            label: kind.as_token().replace('_', " "),
            stats: kind.base_stats(),
            source_mod: None,
        }
    }
}

/// Per-kind agent definitions. Every kind always has an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentDefDatabase {
    defs: BTreeMap<AgentKind, AgentDef>,
}

impl Default for AgentDefDatabase {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AgentDefDatabase {
    pub fn builtin() -> Self {
        let defs = AgentKind::ALL
            .into_iter()
            .map(|kind| (kind, AgentDef::builtin(kind)))
            .collect();
        Self { defs }
    }

    pub(crate) fn def_mut(&mut self, kind: AgentKind) -> &mut AgentDef {
        self.defs
            .entry(kind)
            .or_insert_with(|| AgentDef::builtin(kind))
    }

    pub fn def(&self, kind: AgentKind) -> Option<&AgentDef> {
        self.defs.get(&kind)
    }

    pub fn stats_for(&self, kind: AgentKind) -> AgentStats {
        self.defs
            .get(&kind)
            .map(|def| def.stats)
            .unwrap_or_else(|| kind.base_stats())
    }

    pub fn defs(&self) -> impl Iterator<Item = &AgentDef> {
        self.defs.values()
    }

    pub fn overridden_count(&self) -> usize {
        self.defs
            .values()
            .filter(|def| def.source_mod.is_some())
            .count()
    }
}
