//! Build-input layers and their checksum snapshots.
//!
//! Layers are ordered from least to most volatile. A snapshot maps each
//! layer to the checksum of its inputs; comparing two snapshots tells which
//! layers changed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::checksum::{parse_hex, to_hex};

/// One independently-checksummed group of build inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layer {
    /// Static image definition files; rarely change.
    BaseDefinition,
    /// Helper scripts copied into the image.
    SupportScripts,
    /// Frequently edited profile configuration.
    ProfileConfig,
}

impl Layer {
    /// All layers, least volatile first.
    pub const ALL: [Layer; 3] = [
        Layer::BaseDefinition,
        Layer::SupportScripts,
        Layer::ProfileConfig,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Layer::BaseDefinition => "base-definition",
            Layer::SupportScripts => "support-scripts",
            Layer::ProfileConfig => "profile-config",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Layer::ALL
            .into_iter()
            .find(|layer| layer.name() == s)
            .ok_or_else(|| format!("unknown layer '{s}'"))
    }
}

/// Checksum of every layer's current inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildLayerSnapshot {
    layers: BTreeMap<Layer, u32>,
}

impl BuildLayerSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, layer: Layer, checksum: u32) {
        self.layers.insert(layer, checksum);
    }

    pub fn get(&self, layer: Layer) -> Option<u32> {
        self.layers.get(&layer).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Layer, u32)> + '_ {
        self.layers.iter().map(|(layer, sum)| (*layer, *sum))
    }

    /// Layers whose checksum differs from `previous` (or is absent there).
    pub fn changed_since(&self, previous: &BuildLayerSnapshot) -> BTreeSet<Layer> {
        Layer::ALL
            .into_iter()
            .filter(|layer| self.get(*layer) != previous.get(*layer) || self.get(*layer).is_none())
            .collect()
    }

    /// Render as `layer-name:8hex` lines, one per layer, in layer order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (layer, sum) in self.iter() {
            out.push_str(layer.name());
            out.push(':');
            out.push_str(&to_hex(sum));
            out.push('\n');
        }
        out
    }

    /// Parse the text form produced by `render`.
    ///
    /// Blank lines are ignored; any other malformed line is an error.
    pub fn parse(contents: &str) -> Result<Self, String> {
        let mut snapshot = Self::new();
        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (name, hex) = line
                .split_once(':')
                .ok_or_else(|| format!("line {}: expected 'layer:checksum'", lineno + 1))?;
            let layer: Layer = name
                .trim()
                .parse()
                .map_err(|err| format!("line {}: {err}", lineno + 1))?;
            let sum = parse_hex(hex.trim()).ok_or_else(|| {
                format!("line {}: checksum must be 8 lowercase hex digits", lineno + 1)
            })?;
            if snapshot.layers.insert(layer, sum).is_some() {
                return Err(format!("line {}: duplicate layer '{layer}'", lineno + 1));
            }
        }
        Ok(snapshot)
    }
}

/// Answer of the build-cache gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildDecision {
    pub rebuild: bool,
    pub changed_layers: BTreeSet<Layer>,
}

impl RebuildDecision {
    pub fn all_layers() -> Self {
        Self {
            rebuild: true,
            changed_layers: Layer::ALL.into_iter().collect(),
        }
    }

    pub fn from_changed(changed_layers: BTreeSet<Layer>) -> Self {
        Self {
            rebuild: !changed_layers.is_empty(),
            changed_layers,
        }
    }
}
