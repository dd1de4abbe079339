use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::{debug, info};

use crate::sim::AgentKind;
use crate::AppPaths;

use super::database::AgentDefDatabase;
use super::discovery::discover_mod_sources;
use super::types::{ContentDiscoveryError, ContentRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    Discovery,
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateDefInMod,
}

#[derive(Debug, Clone)]
pub struct ContentCompileError {
    pub code: ContentErrorCode,
    pub message: String,
    pub mod_id: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ContentCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (mod={}, file={}, line={}, column={})",
                self.code,
                self.message,
                self.mod_id,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (mod={}, file={})",
                self.code,
                self.message,
                self.mod_id,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for ContentCompileError {}

/// Field-level patch from one `<AgentDef>`; unset fields keep the value
/// merged so far.
#[derive(Debug, Clone, Default)]
struct AgentDefPatch {
    kind: Option<AgentKind>,
    label: Option<String>,
    hostile: Option<bool>,
    max_health: Option<f32>,
    attack_damage: Option<f32>,
    attack_cooldown_seconds: Option<f32>,
    walk_speed: Option<f32>,
    run_speed: Option<f32>,
}

/// Loads built-in agent stats and applies `<AgentDef>` overrides from
/// `base` and each enabled mod, in load order.
pub fn compile_agent_defs(
    app_paths: &AppPaths,
    request: &ContentRequest,
) -> Result<AgentDefDatabase, ContentCompileError> {
    let sources = discover_mod_sources(app_paths, request)
        .map_err(|error| map_discovery_error(error, &app_paths.root))?;

    let mut database = AgentDefDatabase::builtin();

    for source in sources {
        let xml_files = collect_xml_files_sorted(&source.source_dir)
            .map_err(|error| read_error(&source.mod_id, error.path, error.source))?;
        let mut seen_in_mod = HashSet::<AgentKind>::new();

        for xml_file in xml_files {
            let raw = fs::read_to_string(&xml_file)
                .map_err(|source_err| read_error(&source.mod_id, xml_file.clone(), source_err))?;
            let patches = parse_defs_document(&source.mod_id, &xml_file, &raw)?;
            for (kind, patch) in patches {
                if !seen_in_mod.insert(kind) {
                    return Err(ContentCompileError {
                        code: ContentErrorCode::DuplicateDefInMod,
                        message: format!(
                            "duplicate AgentDef for kind '{}' in mod '{}'; each mod may define a kind only once",
                            kind.as_token(),
                            source.mod_id
                        ),
                        mod_id: source.mod_id.clone(),
                        file_path: xml_file.clone(),
                        location: None,
                    });
                }
                apply_patch(&mut database, kind, patch, &source.mod_id);
                debug!(
                    mod_id = %source.mod_id,
                    kind = kind.as_token(),
                    file = %xml_file.display(),
                    "agent_def_applied"
                );
            }
        }
    }

    info!(
        overridden_kinds = database.overridden_count(),
        enabled_mods = request.enabled_mods.len(),
        "agent_defs_compiled"
    );
    Ok(database)
}

fn apply_patch(database: &mut AgentDefDatabase, kind: AgentKind, patch: AgentDefPatch, mod_id: &str) {
    let def = database.def_mut(kind);
    if let Some(label) = patch.label {
        def.label = label;
    }
    let stats = &mut def.stats;
    if let Some(value) = patch.hostile {
        stats.hostile = value;
    }
    if let Some(value) = patch.max_health {
        stats.max_health = value;
    }
    if let Some(value) = patch.attack_damage {
        stats.attack_damage = value;
    }
    if let Some(value) = patch.attack_cooldown_seconds {
        stats.attack_cooldown_seconds = value;
    }
    if let Some(value) = patch.walk_speed {
        stats.walk_speed = value;
    }
    if let Some(value) = patch.run_speed {
        stats.run_speed = value;
    }
    def.source_mod = Some(mod_id.to_string());
}

fn parse_defs_document(
    mod_id: &str,
    file_path: &Path,
    raw: &str,
) -> Result<Vec<(AgentKind, AgentDefPatch)>, ContentCompileError> {
    let doc = Document::parse(raw).map_err(|error| ContentCompileError {
        code: ContentErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        mod_id: mod_id.to_string(),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;

    let root = doc.root_element();
    if root.tag_name().name() != "Defs" {
        return Err(error_at_node(
            ContentErrorCode::InvalidRoot,
            "root element must be <Defs>".to_string(),
            mod_id,
            file_path,
            &doc,
            root,
        ));
    }

    let mut patches = Vec::new();
    for child in root.children().filter(|node| node.is_element()) {
        if child.tag_name().name() != "AgentDef" {
            return Err(error_at_node(
                ContentErrorCode::UnknownDefType,
                format!(
                    "unsupported def type <{}>; only <AgentDef> is recognised",
                    child.tag_name().name()
                ),
                mod_id,
                file_path,
                &doc,
                child,
            ));
        }
        patches.push(parse_agent_def(mod_id, file_path, &doc, child)?);
    }

    Ok(patches)
}

fn parse_agent_def(
    mod_id: &str,
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> Result<(AgentKind, AgentDefPatch), ContentCompileError> {
    let mut seen_fields = HashSet::<String>::new();
    let mut patch = AgentDefPatch::default();

    for field in node.children().filter(|child| child.is_element()) {
        let field_name = field.tag_name().name().to_string();
        if !seen_fields.insert(field_name.clone()) {
            return Err(error_at_node(
                ContentErrorCode::DuplicateField,
                format!("duplicate field <{}> in <AgentDef>", field_name),
                mod_id,
                file_path,
                doc,
                field,
            ));
        }

        let text = required_text(mod_id, file_path, doc, field, &field_name)?;
        match field_name.as_str() {
            "kind" => {
                let kind = AgentKind::from_token(&text).ok_or_else(|| {
                    let allowed = AgentKind::ALL
                        .iter()
                        .map(|kind| kind.as_token())
                        .collect::<Vec<_>>()
                        .join(", ");
                    error_at_node(
                        ContentErrorCode::InvalidValue,
                        format!("invalid kind '{}'; allowed values: {}", text, allowed),
                        mod_id,
                        file_path,
                        doc,
                        field,
                    )
                })?;
                patch.kind = Some(kind);
            }
            "label" => patch.label = Some(text),
            "hostile" => {
                let parsed = match text.as_str() {
                    "true" => true,
                    "false" => false,
                    _ => {
                        return Err(error_at_node(
                            ContentErrorCode::InvalidValue,
                            format!("hostile '{}' must be true or false", text),
                            mod_id,
                            file_path,
                            doc,
                            field,
                        ))
                    }
                };
                patch.hostile = Some(parsed);
            }
            "maxHealth" => {
                patch.max_health = Some(parse_number(
                    mod_id, file_path, doc, field, &field_name, &text, NumberRule::Positive,
                )?)
            }
            "attackDamage" => {
                patch.attack_damage = Some(parse_number(
                    mod_id,
                    file_path,
                    doc,
                    field,
                    &field_name,
                    &text,
                    NumberRule::NonNegative,
                )?)
            }
            "attackCooldown" => {
                patch.attack_cooldown_seconds = Some(parse_number(
                    mod_id, file_path, doc, field, &field_name, &text, NumberRule::Positive,
                )?)
            }
            "walkSpeed" => {
                patch.walk_speed = Some(parse_number(
                    mod_id,
                    file_path,
                    doc,
                    field,
                    &field_name,
                    &text,
                    NumberRule::NonNegative,
                )?)
            }
            "runSpeed" => {
                patch.run_speed = Some(parse_number(
                    mod_id,
                    file_path,
                    doc,
                    field,
                    &field_name,
                    &text,
                    NumberRule::NonNegative,
                )?)
            }
            _ => {
                return Err(error_at_node(
                    ContentErrorCode::UnknownField,
                    format!("unknown field <{}> in <AgentDef>", field_name),
                    mod_id,
                    file_path,
                    doc,
                    field,
                ))
            }
        }
    }

    let Some(kind) = patch.kind else {
        return Err(error_at_node(
            ContentErrorCode::MissingField,
            "missing required field <kind> in <AgentDef>".to_string(),
            mod_id,
            file_path,
            doc,
            node,
        ));
    };
    Ok((kind, patch))
}

#[derive(Debug, Clone, Copy)]
enum NumberRule {
    Positive,
    NonNegative,
}

fn parse_number(
    mod_id: &str,
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    field_name: &str,
    text: &str,
    rule: NumberRule,
) -> Result<f32, ContentCompileError> {
    let parsed = text.parse::<f32>().map_err(|_| {
        error_at_node(
            ContentErrorCode::InvalidValue,
            format!("{} '{}' is not a valid number", field_name, text),
            mod_id,
            file_path,
            doc,
            node,
        )
    })?;
    let (ok, bound) = match rule {
        NumberRule::Positive => (parsed.is_finite() && parsed > 0.0, "> 0"),
        NumberRule::NonNegative => (parsed.is_finite() && parsed >= 0.0, ">= 0"),
    };
    if !ok {
        return Err(error_at_node(
            ContentErrorCode::InvalidValue,
            format!("{} must be finite and {}", field_name, bound),
            mod_id,
            file_path,
            doc,
            node,
        ));
    }
    Ok(parsed)
}

fn required_text(
    mod_id: &str,
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<String, ContentCompileError> {
    let value = node.text().map(str::trim).unwrap_or_default().to_string();
    if value.is_empty() {
        return Err(error_at_node(
            ContentErrorCode::MissingField,
            format!("field <{}> must not be empty", field_name),
            mod_id,
            file_path,
            doc,
            node,
        ));
    }
    Ok(value)
}

fn error_at_node(
    code: ContentErrorCode,
    message: String,
    mod_id: &str,
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> ContentCompileError {
    let pos = doc.text_pos_at(node.range().start);
    ContentCompileError {
        code,
        message,
        mod_id: mod_id.to_string(),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }),
    }
}

struct ReadError {
    path: PathBuf,
    source: std::io::Error,
}

fn collect_xml_files_sorted(root: &Path) -> Result<Vec<PathBuf>, ReadError> {
    let mut files = Vec::<(String, PathBuf)>::new();
    collect_recursive(root, root, &mut files)?;
    files.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

fn collect_recursive(
    root: &Path,
    current: &Path,
    files: &mut Vec<(String, PathBuf)>,
) -> Result<(), ReadError> {
    let entries = fs::read_dir(current).map_err(|source| ReadError {
        path: current.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ReadError {
            path: current.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(root, &path, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        {
            let relative = path.strip_prefix(root).unwrap_or(&path);
            files.push((normalize_rel_path(relative), path.clone()));
        }
    }
    Ok(())
}

fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_error(mod_id: &str, path: PathBuf, source: std::io::Error) -> ContentCompileError {
    ContentCompileError {
        code: ContentErrorCode::ReadFile,
        message: format!("failed to read XML file: {source}"),
        mod_id: mod_id.to_string(),
        file_path: path,
        location: None,
    }
}

fn map_discovery_error(error: ContentDiscoveryError, root: &Path) -> ContentCompileError {
    match error {
        ContentDiscoveryError::EnabledModMissing {
            mod_id,
            expected_dir,
        } => ContentCompileError {
            code: ContentErrorCode::Discovery,
            message: format!(
                "enabled mod '{}' not found at {}; check NPC_SIM_ENABLED_MODS",
                mod_id,
                expected_dir.display()
            ),
            mod_id,
            file_path: expected_dir,
            location: None,
        },
        other => ContentCompileError {
            code: ContentErrorCode::Discovery,
            message: other.to_string(),
            mod_id: "<discovery>".to_string(),
            file_path: root.to_path_buf(),
            location: None,
        },
    }
}
