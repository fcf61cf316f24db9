//! Embedded bundle metadata templates and product naming.
//!
//! Framework and AAR metadata files are rendered from templates compiled into
//! the binary, so the generated bundle layout is fixed by data rather than by
//! ad hoc string building.

use include_dir::{Dir, include_dir};

use crate::types::BuildError;

const ANDROID_TEMPLATES: Dir = include_dir!("$CARGO_MANIFEST_DIR/templates/android");
const IOS_TEMPLATES: Dir = include_dir!("$CARGO_MANIFEST_DIR/templates/ios");

/// Template variable replacing `{{name}}` in template files.
#[derive(Debug, Clone)]
pub struct TemplateVar {
    pub name: &'static str,
    pub value: String,
}

impl TemplateVar {
    pub fn new(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

fn render_embedded(dir: &Dir, file: &str, vars: &[TemplateVar]) -> Result<String, BuildError> {
    let template = dir
        .get_file(file)
        .and_then(|f| f.contents_utf8())
        .ok_or_else(|| BuildError::Assembly(format!("missing embedded template {}", file)))?;
    let rendered = render_template(template, vars);
    validate_no_unreplaced_placeholders(&rendered, file)?;
    Ok(rendered)
}

fn render_template(input: &str, vars: &[TemplateVar]) -> String {
    let mut output = input.to_string();
    for var in vars {
        output = output.replace(&format!("{{{{{}}}}}", var.name), &var.value);
    }
    output
}

fn validate_no_unreplaced_placeholders(content: &str, file: &str) -> Result<(), BuildError> {
    let mut pos = 0;
    let mut unreplaced = Vec::new();
    while let Some(start) = content[pos..].find("{{") {
        let abs_start = pos + start;
        let Some(end) = content[abs_start..].find("}}") else {
            break;
        };
        let var_name = &content[abs_start + 2..abs_start + end];
        if !var_name.is_empty() && !var_name.contains(' ') {
            unreplaced.push(var_name.to_string());
        }
        pos = abs_start + end + 2;
    }
    if !unreplaced.is_empty() {
        return Err(BuildError::Assembly(format!(
            "template {} has unreplaced placeholders: {:?}",
            file, unreplaced
        )));
    }
    Ok(())
}

/// `AndroidManifest.xml` for an AAR.
pub fn android_manifest(java_package: &str, min_sdk: u32) -> Result<String, BuildError> {
    render_embedded(
        &ANDROID_TEMPLATES,
        "AndroidManifest.xml.template",
        &[
            TemplateVar::new("java_package", java_package),
            TemplateVar::new("min_sdk", min_sdk.to_string()),
        ],
    )
}

/// Contents of `proguard.txt` for an AAR.
pub fn proguard_rules() -> Result<String, BuildError> {
    render_embedded(&ANDROID_TEMPLATES, "proguard.txt", &[])
}

/// `Resources/Info.plist` for a framework.
pub fn info_plist(name: &str, bundle_id: &str, min_os_version: &str) -> Result<String, BuildError> {
    render_embedded(
        &IOS_TEMPLATES,
        "Info.plist.template",
        &[
            TemplateVar::new("name", name),
            TemplateVar::new("bundle_id", bundle_id),
            TemplateVar::new("min_os_version", min_os_version),
        ],
    )
}

/// `Modules/module.modulemap` for a framework.
pub fn module_map(name: &str) -> Result<String, BuildError> {
    render_embedded(
        &IOS_TEMPLATES,
        "module.modulemap.template",
        &[TemplateVar::new("name", name)],
    )
}

/// Umbrella header `<name>.h` importing every header in the framework.
pub fn umbrella_header(name: &str, packages: &[String], headers: &[String]) -> Result<String, BuildError> {
    let package_list = packages
        .iter()
        .map(|p| format!("//   {}", p))
        .collect::<Vec<_>>()
        .join("\n");
    let imports = headers
        .iter()
        .map(|h| format!("#include \"{}\"", h))
        .collect::<Vec<_>>()
        .join("\n");
    render_embedded(
        &IOS_TEMPLATES,
        "umbrella.h.template",
        &[
            TemplateVar::new("name", name),
            TemplateVar::new("package_list", package_list),
            TemplateVar::new("imports", imports),
        ],
    )
}

/// Shared-library / executable name for an Android package.
///
/// Non-identifier characters become `_`, a leading digit gains a `_` prefix
/// and Java keywords gain a `_` suffix.
pub fn library_name(base: &str) -> String {
    let mut name = String::with_capacity(base.len() + 1);
    for c in base.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' };
        if name.is_empty() && c.is_ascii_digit() {
            name.push('_');
        }
        name.push(c);
    }
    if JAVA_KEYWORDS.contains(&name.as_str()) {
        name.push('_');
    }
    name
}

const JAVA_KEYWORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "final", "finally", "float",
    "for", "goto", "if", "implements", "import", "instanceof", "int", "interface", "long",
    "native", "new", "package", "private", "protected", "public", "return", "short", "static",
    "strictfp", "super", "switch", "synchronized", "this", "throw", "throws", "transient", "try",
    "void", "volatile", "while",
];

/// iOS product name: an RFC 1034 label, `ProductName` when nothing survives.
pub fn product_name(base: &str) -> String {
    let bytes = base.as_bytes();
    let mut label = String::with_capacity(bytes.len());
    for (i, &c) in bytes.iter().enumerate() {
        let leading = i == 0;
        let trailing = i == bytes.len() - 1;
        match c {
            b'a'..=b'z' | b'A'..=b'Z' => label.push(c as char),
            b'0'..=b'9' if !leading => label.push(c as char),
            b'-' if !leading && !trailing => label.push('-'),
            _ => {
                if !label.is_empty() && !label.ends_with('-') && !trailing {
                    label.push('-');
                }
            }
        }
    }
    if label.is_empty() {
        "ProductName".to_string()
    } else {
        label
    }
}

/// Upper-cases the first character: `asset` becomes `Asset`.
pub fn title_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lower-cased alphanumerics only, for bundle identifier components.
pub fn sanitize_bundle_id_component(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}
