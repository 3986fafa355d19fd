//! Feature registry: per-feature version tables mapping function and
//! event indices to message descriptors.
//!
//! Versions form a linear inheritance chain. Version `v+1` starts from
//! `v`'s maps and may add or override entries; the chain is folded when a
//! version-bound facade is created, so lookups never walk the chain at
//! call time.

use std::collections::BTreeMap;

use crate::error::{ProtocolError, Result};
use crate::message::ReportId;

/// Descriptor of one function: its request/response report shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSpec {
    pub function_index: u8,
    pub name: &'static str,
    pub request_report: ReportId,
    pub response_report: ReportId,
}

/// Descriptor of one broadcast event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSpec {
    pub event_index: u8,
    pub name: &'static str,
    pub report: ReportId,
}

/// One version's additions/overrides relative to the previous version.
#[derive(Debug, Clone)]
pub struct VersionTable {
    pub version: u8,
    pub functions: Vec<FunctionSpec>,
    pub events: Vec<EventSpec>,
    pub max_function_index: u8,
}

/// A registered feature: id plus its linear version chain (ascending).
#[derive(Debug, Clone)]
pub struct Feature {
    pub id: u16,
    pub name: &'static str,
    pub versions: Vec<VersionTable>,
}

impl Feature {
    /// Build a version-bound facade by folding the inheritance chain up
    /// to and including `version`.
    pub fn create(&self, version: u8) -> Result<FeatureFacade> {
        if !self.versions.iter().any(|t| t.version == version) {
            return Err(ProtocolError::UnsupportedVersion {
                feature_id: self.id,
                version,
            });
        }
        let mut functions = BTreeMap::new();
        let mut events = BTreeMap::new();
        let mut max_function_index = 0;
        for table in self.versions.iter().filter(|t| t.version <= version) {
            for f in &table.functions {
                functions.insert(f.function_index, *f);
            }
            for e in &table.events {
                events.insert(e.event_index, *e);
            }
            max_function_index = table.max_function_index;
        }
        Ok(FeatureFacade {
            feature_id: self.id,
            name: self.name,
            version,
            max_function_index,
            functions,
            events,
        })
    }
}

/// A version-bound view of one feature.
#[derive(Debug, Clone)]
pub struct FeatureFacade {
    pub feature_id: u16,
    pub name: &'static str,
    pub version: u8,
    pub max_function_index: u8,
    functions: BTreeMap<u8, FunctionSpec>,
    events: BTreeMap<u8, EventSpec>,
}

impl FeatureFacade {
    pub fn function(&self, function_index: u8) -> Option<&FunctionSpec> {
        self.functions.get(&function_index)
    }

    pub fn event(&self, event_index: u8) -> Option<&EventSpec> {
        self.events.get(&event_index)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionSpec> {
        self.functions.values()
    }

    pub fn events(&self) -> impl Iterator<Item = &EventSpec> {
        self.events.values()
    }

    /// Events occupy function indices above the function range, paired
    /// with the `software_id == 0` convention.
    pub fn is_event_index(&self, function_index: u8) -> bool {
        function_index > self.max_function_index
    }
}

/// Process-wide table of features, keyed by feature id.
#[derive(Debug, Default)]
pub struct FeatureRegistry {
    features: BTreeMap<u16, Feature>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with every built-in feature.
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        for feature in crate::features::all() {
            reg.register(feature);
        }
        reg
    }

    pub fn register(&mut self, feature: Feature) {
        self.features.insert(feature.id, feature);
    }

    pub fn get(&self, feature_id: u16) -> Option<&Feature> {
        self.features.get(&feature_id)
    }

    /// Shorthand for `get` + `create`.
    pub fn create(&self, feature_id: u16, version: u8) -> Result<FeatureFacade> {
        self.features
            .get(&feature_id)
            .ok_or(ProtocolError::UnsupportedVersion {
                feature_id,
                version,
            })?
            .create(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_version_feature() -> Feature {
        Feature {
            id: 0x1861,
            name: "test",
            versions: vec![
                VersionTable {
                    version: 0,
                    functions: vec![
                        FunctionSpec {
                            function_index: 0,
                            name: "getInfo",
                            request_report: ReportId::Short,
                            response_report: ReportId::Long,
                        },
                        FunctionSpec {
                            function_index: 1,
                            name: "measure",
                            request_report: ReportId::Short,
                            response_report: ReportId::Long,
                        },
                    ],
                    events: vec![],
                    max_function_index: 1,
                },
                VersionTable {
                    version: 1,
                    functions: vec![
                        // override: measure becomes a long request
                        FunctionSpec {
                            function_index: 1,
                            name: "measure",
                            request_report: ReportId::Long,
                            response_report: ReportId::Long,
                        },
                        FunctionSpec {
                            function_index: 2,
                            name: "setSource",
                            request_report: ReportId::Long,
                            response_report: ReportId::Long,
                        },
                    ],
                    events: vec![EventSpec {
                        event_index: 0,
                        name: "measured",
                        report: ReportId::Long,
                    }],
                    max_function_index: 2,
                },
            ],
        }
    }

    #[test]
    fn version_zero_sees_only_base_entries() {
        let facade = two_version_feature().create(0).unwrap();
        assert_eq!(facade.max_function_index, 1);
        assert!(facade.function(2).is_none());
        assert_eq!(
            facade.function(1).unwrap().request_report,
            ReportId::Short
        );
        assert!(facade.event(0).is_none());
    }

    #[test]
    fn later_version_inherits_and_overrides() {
        let facade = two_version_feature().create(1).unwrap();
        assert_eq!(facade.max_function_index, 2);
        // inherited
        assert_eq!(facade.function(0).unwrap().name, "getInfo");
        // overridden
        assert_eq!(facade.function(1).unwrap().request_report, ReportId::Long);
        // added
        assert_eq!(facade.function(2).unwrap().name, "setSource");
        assert_eq!(facade.event(0).unwrap().name, "measured");
    }

    #[test]
    fn unknown_version_is_rejected() {
        let err = two_version_feature().create(3).unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedVersion { .. }));
    }

    #[test]
    fn event_index_convention() {
        let facade = two_version_feature().create(1).unwrap();
        assert!(!facade.is_event_index(2));
        assert!(facade.is_event_index(3));
    }

    #[test]
    fn builtin_registry_exposes_features() {
        let reg = FeatureRegistry::builtin();
        assert!(reg.get(0x0000).is_some());
        assert!(reg.get(0x0005).is_some());
        assert!(reg.get(0x1E02).is_some());
        assert!(reg.create(0x1861, 1).is_ok());
    }
}
