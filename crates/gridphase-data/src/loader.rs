//! Resolution pipeline: reads data files, resolves mRID and node names, builds a network.
//!
//! Provides format detection (RON/JSON/TOML), file discovery and
//! deserialization helpers, plus the loaders for network fixtures, trace
//! configuration and study directories that hold both.

use gridphase_core::config::SetPhasesConfig;
use gridphase_core::id::{EquipmentId, NodeId};
use gridphase_core::network::{
    EquipmentKind, Network, NetworkError, NetworkGraph, StateView, SwitchState,
};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::schema::{EquipmentData, EquipmentKindData, NetworkData, OpenData};

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    /// A duplicate name was found.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// The resolved data does not form a valid network.
    #[error("invalid network in {file}: {source}")]
    Network {
        file: PathBuf,
        #[source]
        source: NetworkError,
    },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a data file with the given base name (without extension).
///
/// Looks for `{base_name}.ron`, `{base_name}.toml`, and `{base_name}.json`.
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// multiple formats exist for the same base name.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;

    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing,
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

/// Like [`find_data_file`], but returns an error if no file is found.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    deserialize_str(&content, format, path)
}

/// Deserialize `content` in `format`. `path` is only used for error reports.
pub fn deserialize_str<T: DeserializeOwned>(
    content: &str,
    format: Format,
    path: &Path,
) -> Result<T, DataLoadError> {
    let parse_error = |detail: String| DataLoadError::Parse {
        file: path.to_path_buf(),
        detail,
    };
    match format {
        Format::Ron => ron::from_str(content).map_err(|e| parse_error(e.to_string())),
        Format::Json => serde_json::from_str(content).map_err(|e| parse_error(e.to_string())),
        Format::Toml => toml::from_str(content).map_err(|e| parse_error(e.to_string())),
    }
}

// ===========================================================================
// Name resolution helpers
// ===========================================================================

/// Look up a name in a map, returning an `UnresolvedRef` error if not found.
pub fn resolve_name<'a, V>(
    map: &'a HashMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<&'a V, DataLoadError> {
    map.get(name).ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    })
}

/// Check whether a name already exists in a map, returning a `DuplicateName`
/// error if so.
pub fn check_duplicate<V>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

// ===========================================================================
// Network resolution
// ===========================================================================

/// Build a [`Network`] from fixture data read from `file`.
///
/// Segments and other hosts are added before the cuts and clamps that name
/// them, so attachments may appear anywhere in the list. Terminals naming
/// the same node are joined.
pub fn resolve_network(data: NetworkData, file: &Path) -> Result<Network, DataLoadError> {
    let network_error = |source: NetworkError| DataLoadError::Network {
        file: file.to_path_buf(),
        source,
    };

    let mut seen: HashMap<String, ()> = HashMap::new();
    for equipment in &data.equipment {
        check_duplicate(&seen, &equipment.mrid, file)?;
        seen.insert(equipment.mrid.clone(), ());
    }

    let (attachments, hosts): (Vec<&EquipmentData>, Vec<&EquipmentData>) = data
        .equipment
        .iter()
        .partition(|e| e.kind.segment().is_some());

    let mut graph = NetworkGraph::new();
    let mut ids: HashMap<String, EquipmentId> = HashMap::new();
    for equipment in hosts.into_iter().chain(attachments) {
        let kind = match &equipment.kind {
            EquipmentKindData::Cut {
                segment,
                length_from_t1,
                ..
            } => {
                let segment = *resolve_name(&ids, segment, file, "AC line segment")?;
                EquipmentKind::cut(segment, *length_from_t1)
            }
            EquipmentKindData::Clamp {
                segment,
                length_from_t1,
            } => {
                let segment = *resolve_name(&ids, segment, file, "AC line segment")?;
                EquipmentKind::clamp(segment, *length_from_t1)
            }
            other => host_kind(other),
        };
        let phases: Vec<_> = equipment.terminals.iter().map(|t| t.phases).collect();
        let id = graph
            .add_equipment(equipment.mrid.as_str(), kind, &phases)
            .map_err(network_error)?;
        apply_states(&mut graph, id, equipment).map_err(network_error)?;
        ids.insert(equipment.mrid.clone(), id);
    }

    let mut nodes: HashMap<String, NodeId> = HashMap::new();
    for equipment in &data.equipment {
        let id = *resolve_name(&ids, &equipment.mrid, file, "equipment")?;
        let terminals = graph
            .equipment(id)
            .map(|e| e.terminals().to_vec())
            .unwrap_or_default();
        for (terminal, record) in terminals.into_iter().zip(&equipment.terminals) {
            let Some(name) = &record.node else {
                continue;
            };
            let node = *nodes
                .entry(name.clone())
                .or_insert_with(|| graph.add_node());
            graph
                .connect_to_node(terminal, node)
                .map_err(network_error)?;
        }
    }

    log::debug!(
        "resolved {} equipment and {} nodes from {}",
        graph.equipment_count(),
        graph.node_count(),
        file.display()
    );
    Ok(Network::from_graph(graph))
}

fn host_kind(kind: &EquipmentKindData) -> EquipmentKind {
    match kind {
        EquipmentKindData::Plain => EquipmentKind::Plain,
        EquipmentKindData::Switch { feeder_breaker, .. } => EquipmentKind::Switch(if *feeder_breaker {
            SwitchState::feeder_breaker()
        } else {
            SwitchState::closed()
        }),
        EquipmentKindData::BusbarSection => EquipmentKind::BusbarSection,
        EquipmentKindData::AcLineSegment { length } => EquipmentKind::line_segment(*length),
        EquipmentKindData::PowerTransformer => EquipmentKind::PowerTransformer,
        EquipmentKindData::EnergySource { phases } => EquipmentKind::EnergySource {
            phases: phases.clone(),
        },
        // Attachments are resolved by the caller.
        EquipmentKindData::Cut { .. } | EquipmentKindData::Clamp { .. } => EquipmentKind::Plain,
    }
}

/// Apply service flags and open states.
fn apply_states(
    graph: &mut NetworkGraph,
    id: EquipmentId,
    equipment: &EquipmentData,
) -> Result<(), NetworkError> {
    graph.set_in_service(id, StateView::Normal, equipment.normally_in_service)?;
    graph.set_in_service(id, StateView::Current, equipment.in_service)?;

    let (normally_open, open) = match &equipment.kind {
        EquipmentKindData::Switch {
            normally_open,
            open,
            ..
        }
        | EquipmentKindData::Cut {
            normally_open,
            open,
            ..
        } => (normally_open, open),
        _ => return Ok(()),
    };
    for (view, state) in [(StateView::Normal, normally_open), (StateView::Current, open)] {
        match state {
            OpenData::All(open) => graph.set_open(id, view, None, *open)?,
            OpenData::Cores(cores) => {
                for core in cores {
                    graph.set_open(id, view, Some(*core), true)?;
                }
            }
        }
    }
    Ok(())
}

// ===========================================================================
// Loading
// ===========================================================================

/// Load and resolve a network fixture file.
pub fn load_network(path: &Path) -> Result<Network, DataLoadError> {
    let data: NetworkData = deserialize_file(path)?;
    resolve_network(data, path)
}

/// Load trace configuration. Omitted fields take their defaults.
pub fn load_config(path: &Path) -> Result<SetPhasesConfig, DataLoadError> {
    deserialize_file(path)
}

/// A network together with the configuration to trace it with.
#[derive(Debug, Clone)]
pub struct StudyData {
    pub network: Network,
    pub config: SetPhasesConfig,
}

/// Load a study directory.
///
/// `network.{ron,toml,json}` is required. `set_phases.{ron,toml,json}` is
/// optional and falls back to the default configuration.
pub fn load_study(dir: &Path) -> Result<StudyData, DataLoadError> {
    let network = load_network(&require_data_file(dir, "network")?)?;
    let config = match find_data_file(dir, "set_phases")? {
        Some(path) => load_config(&path)?,
        None => SetPhasesConfig::default(),
    };
    log::info!("loaded study from {}", dir.display());
    Ok(StudyData { network, config })
}

// ===========================================================================
// Tests
// ===========================================================================
