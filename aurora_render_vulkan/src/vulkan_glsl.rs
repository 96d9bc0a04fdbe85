/// OpenGL-flavoured GLSL to Vulkan GLSL
///
/// Programs are written once against the GL conventions (loose uniforms,
/// combined samplers, implicit locations). Before naga compiles them for
/// Vulkan each stage is rewritten:
/// - `#version` becomes `#version 450`,
/// - uniform blocks get `layout(std140, set = 0, binding = <register>)`,
/// - loose uniforms move into one std140 block per stage
///   (`AuroraVertexUniforms`, `AuroraFragmentUniforms`) whose members keep
///   their names,
/// - `sampler2D` / `samplerCube` uniforms split into a texture and a
///   sampler, and every use becomes a `sampler2D(texture, sampler)`
///   constructor,
/// - inputs and outputs without a location get one. Fragment inputs reuse
///   the location of the vertex output with the same name.
///
/// Top-level declarations are recognised token by token; function bodies
/// are only touched by identifier replacement.

use rustc_hash::FxHashMap;
use aurora_render::aurora::Result;
use aurora_render::aurora::render::{ShaderReflection, ShaderResourceType, ShaderStageFlags};
use aurora_render::{engine_bail_warn, engine_trace};

const SOURCE: &str = "aurora::vulkan::Glsl";

pub const VERTEX_UNIFORMS_BLOCK: &str = "AuroraVertexUniforms";
pub const FRAGMENT_UNIFORMS_BLOCK: &str = "AuroraFragmentUniforms";

// ===== BINDINGS =====

/// Texture split into a texture and a sampler binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureBinding {
    pub name: String,
    pub resource_type: ShaderResourceType,
    pub texture: u32,
    pub sampler: u32,
}

/// Descriptor bindings of one program, shared by both stages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramBindings {
    /// Block name and binding (the block's register)
    pub blocks: Vec<(String, u32)>,
    pub vertex_uniforms: Option<u32>,
    pub fragment_uniforms: Option<u32>,
    pub textures: Vec<TextureBinding>,
}

impl ProgramBindings {
    /// Blocks keep their register; wrappers and textures follow
    pub fn assign(reflection: &ShaderReflection) -> Result<Self> {
        let mut bindings = Self::default();
        let mut next = 0;
        for block in &reflection.uniform_buffers {
            bindings.blocks.push((block.name().to_string(), block.register()));
            next = next.max(block.register() + 1);
        }

        let has_loose = |stage: ShaderStageFlags| reflection.uniforms.iter().any(|u| u.stage().contains(stage));
        if has_loose(ShaderStageFlags::VERTEX) {
            bindings.vertex_uniforms = Some(next);
            next += 1;
        }
        if has_loose(ShaderStageFlags::FRAGMENT) {
            bindings.fragment_uniforms = Some(next);
            next += 1;
        }

        for resource in &reflection.resources {
            if resource.count > 1 {
                engine_bail_warn!(SOURCE, "Sampler array '{}[{}]' is not supported when compiling GLSL for Vulkan",
                    resource.name, resource.count);
            }
            bindings.textures.push(TextureBinding {
                name: resource.name.clone(),
                resource_type: resource.resource_type,
                texture: next,
                sampler: next + 1,
            });
            next += 2;
        }
        Ok(bindings)
    }

    fn block_binding(&self, name: &str) -> Option<u32> {
        self.blocks.iter().find(|(block, _)| block == name).map(|&(_, binding)| binding)
    }

    fn texture(&self, name: &str) -> Option<&TextureBinding> {
        self.textures.iter().find(|t| t.name == name)
    }

    fn uniforms_block(&self, stage: ShaderStageFlags) -> Option<(&'static str, u32)> {
        if stage == ShaderStageFlags::VERTEX {
            self.vertex_uniforms.map(|binding| (VERTEX_UNIFORMS_BLOCK, binding))
        } else {
            self.fragment_uniforms.map(|binding| (FRAGMENT_UNIFORMS_BLOCK, binding))
        }
    }
}

/// One rewritten stage
#[derive(Debug, Clone)]
pub struct TranslatedStage {
    pub source: String,
    /// Loose uniforms moved into the stage's wrapper block, in member order
    pub loose_uniforms: Vec<String>,
}

// ===== SOURCE SPLITTING =====

/// Replace comments with spaces, keeping line breaks
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '/' && chars.peek() == Some(&'/') {
            for c in chars.by_ref() {
                if c == '\n' {
                    out.push('\n');
                    break;
                }
            }
        } else if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            let mut last = '\0';
            for c in chars.by_ref() {
                if c == '\n' {
                    out.push('\n');
                }
                if last == '*' && c == '/' {
                    break;
                }
                last = c;
            }
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Preprocessor(String),
    /// Declaration or statement ending with `;`
    Declaration(String),
    Function(String),
}

/// A braced item ends at its closing brace only when it is a function
fn is_function_head(head: &str) -> bool {
    let head = head.trim_start();
    let rest = match head.strip_prefix("layout") {
        Some(rest) => match rest.find(')') {
            Some(end) => &rest[end + 1..],
            None => rest,
        },
        None => head,
    };
    rest.contains('(')
}

fn split_items(source: &str) -> Vec<Item> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0u32;
    let mut head_end: Option<usize> = None;

    for line in source.lines() {
        if depth == 0 && current.trim().is_empty() && line.trim_start().starts_with('#') {
            current.clear();
            items.push(Item::Preprocessor(line.trim().to_string()));
            continue;
        }
        for c in line.chars().chain(std::iter::once('\n')) {
            current.push(c);
            match c {
                '{' => {
                    if depth == 0 {
                        head_end = Some(current.len() - 1);
                    }
                    depth += 1;
                }
                '}' => {
                    depth = depth.saturating_sub(1);
                    let is_function = head_end.is_some_and(|end| is_function_head(&current[..end]));
                    if depth == 0 && is_function {
                        items.push(Item::Function(std::mem::take(&mut current)));
                        head_end = None;
                    }
                }
                ';' if depth == 0 => {
                    items.push(Item::Declaration(std::mem::take(&mut current)));
                    head_end = None;
                }
                _ => {}
            }
        }
    }
    if !current.trim().is_empty() {
        items.push(Item::Declaration(current));
    }
    items
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            word.push(c);
            continue;
        }
        if !word.is_empty() {
            tokens.push(std::mem::take(&mut word));
        }
        if !c.is_whitespace() {
            tokens.push(c.to_string());
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}

/// Replace whole-identifier occurrences of `name` (not after a `.`)
fn replace_identifier(text: &str, name: &str, replacement: &str) -> String {
    let bytes = text.as_bytes();
    let is_ident = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < text.len() {
        if text[i..].starts_with(name) {
            let before = if i == 0 { None } else { Some(bytes[i - 1]) };
            let after = bytes.get(i + name.len()).copied();
            let starts = before.map_or(true, |b| !is_ident(b) && b != b'.');
            let ends = after.map_or(true, |b| !is_ident(b));
            if starts && ends {
                out.push_str(replacement);
                i += name.len();
                continue;
            }
        }
        let c = text[i..].chars().next().unwrap_or(' ');
        out.push(c);
        i += c.len_utf8();
    }
    out
}

// ===== DECLARATIONS =====

const INTERPOLATION: [&str; 4] = ["flat", "smooth", "noperspective", "centroid"];

#[derive(Debug, Default)]
struct Declaration {
    /// Qualifiers inside `layout(...)`, one string each
    layout: Vec<String>,
    /// Storage and interpolation qualifiers in source order
    qualifiers: Vec<String>,
    /// Everything after the qualifiers, `;` excluded
    rest: Vec<String>,
}

impl Declaration {
    fn parse(tokens: &[String]) -> Self {
        let mut declaration = Declaration::default();
        let mut pos = 0;
        if tokens.first().map(String::as_str) == Some("layout") && tokens.get(1).map(String::as_str) == Some("(") {
            pos = 2;
            let mut qualifier = Vec::new();
            while let Some(token) = tokens.get(pos) {
                pos += 1;
                match token.as_str() {
                    ")" => break,
                    "," => declaration.layout.push(qualifier.drain(..).collect::<Vec<_>>().join(" ")),
                    _ => qualifier.push(token.clone()),
                }
            }
            if !qualifier.is_empty() {
                declaration.layout.push(qualifier.join(" "));
            }
        }
        while let Some(token) = tokens.get(pos) {
            let storage = matches!(token.as_str(), "uniform" | "in" | "out");
            if !storage && !INTERPOLATION.contains(&token.as_str()) {
                break;
            }
            declaration.qualifiers.push(token.clone());
            pos += 1;
        }
        declaration.rest = tokens[pos..].to_vec();
        if declaration.rest.last().map(String::as_str) == Some(";") {
            declaration.rest.pop();
        }
        declaration
    }

    fn has(&self, qualifier: &str) -> bool {
        self.qualifiers.iter().any(|q| q == qualifier)
    }

    fn location(&self) -> Option<u32> {
        self.layout.iter().find_map(|q| {
            let (key, value) = q.split_once('=')?;
            (key.trim() == "location").then(|| value.trim().parse().ok())?
        })
    }

    /// Type name, skipping a precision qualifier
    fn type_name(&self) -> Option<&str> {
        self.rest
            .iter()
            .map(String::as_str)
            .find(|t| !matches!(*t, "highp" | "mediump" | "lowp"))
    }

    /// `name [N]` pairs after the type
    fn declarators(&self) -> Vec<(String, u32)> {
        let type_pos = self.rest.iter().position(|t| Some(t.as_str()) == self.type_name()).unwrap_or(0);
        let mut out = Vec::new();
        let mut tokens = self.rest[type_pos + 1..].iter().peekable();
        while let Some(name) = tokens.next() {
            if name == "," {
                continue;
            }
            let mut count = 1;
            if tokens.peek().map(|t| t.as_str()) == Some("[") {
                tokens.next();
                count = tokens.next().and_then(|t| t.parse().ok()).unwrap_or(1);
                tokens.next();
            }
            out.push((name.clone(), count));
        }
        out
    }

    fn is_block(&self) -> bool {
        self.rest.iter().any(|t| t == "{")
    }

    fn render(&self, layout: &[String]) -> String {
        let mut out = String::new();
        if !layout.is_empty() {
            out.push_str(&format!("layout({}) ", layout.join(", ")));
        }
        for qualifier in &self.qualifiers {
            out.push_str(qualifier);
            out.push(' ');
        }
        out.push_str(&self.rest.join(" "));
        out.push_str(";\n");
        out
    }
}

fn location_span(type_name: &str, count: u32) -> u32 {
    let columns = match type_name {
        "mat4" => 4,
        "mat3" => 3,
        "mat2" => 2,
        _ => 1,
    };
    columns * count.max(1)
}

// ===== TRANSLATION =====

/// Locations handed out to one stage's inputs or outputs
#[derive(Default)]
struct LocationAllocator {
    used: Vec<u32>,
}

impl LocationAllocator {
    fn reserve(&mut self, location: u32, span: u32) {
        self.used.extend(location..location + span);
    }

    fn next(&mut self, span: u32) -> u32 {
        let mut location = 0;
        while (location..location + span).any(|l| self.used.contains(&l)) {
            location += 1;
        }
        self.reserve(location, span);
        location
    }
}

/// Rewrite one stage
///
/// `varyings` carries vertex output locations by name into the fragment
/// stage; translate the vertex stage first.
pub fn translate_stage(
    source: &str,
    stage: ShaderStageFlags,
    bindings: &ProgramBindings,
    varyings: &mut FxHashMap<String, u32>,
) -> Result<TranslatedStage> {
    let items = split_items(&strip_comments(source));

    // Explicit locations first, so implicit ones go around them
    let mut inputs = LocationAllocator::default();
    let mut outputs = LocationAllocator::default();
    for item in &items {
        if let Item::Declaration(text) = item {
            let declaration = Declaration::parse(&tokenize(text));
            if let (Some(location), Some(type_name)) = (declaration.location(), declaration.type_name()) {
                let span = location_span(type_name, 1);
                if declaration.has("in") {
                    inputs.reserve(location, span);
                } else if declaration.has("out") {
                    outputs.reserve(location, span);
                }
            }
        }
    }
    if stage == ShaderStageFlags::FRAGMENT {
        for &location in varyings.values() {
            inputs.reserve(location, 1);
        }
    }

    let mut out = vec![String::from("#version 450\n")];
    let mut loose: Vec<(String, String, u32)> = Vec::new();
    let mut wrapper_at = None;

    for item in &items {
        match item {
            Item::Preprocessor(line) => {
                if !line.starts_with("#version") {
                    out.push(format!("{}\n", line));
                }
            }
            Item::Function(text) => out.push(text.clone()),
            Item::Declaration(text) => {
                let tokens = tokenize(text);
                let declaration = Declaration::parse(&tokens);
                let Some(type_name) = declaration.type_name().map(str::to_string) else {
                    out.push(text.clone());
                    continue;
                };

                if declaration.has("uniform") {
                    if declaration.is_block() {
                        let Some(binding) = bindings.block_binding(&type_name) else {
                            engine_bail_warn!(SOURCE, "Uniform block '{}' has no binding", type_name);
                        };
                        let layout = vec![
                            "std140".to_string(),
                            "set = 0".to_string(),
                            format!("binding = {}", binding),
                        ];
                        out.push(declaration.render(&layout));
                        continue;
                    }
                    let texture_type = match type_name.as_str() {
                        "sampler2D" => Some("texture2D"),
                        "samplerCube" => Some("textureCube"),
                        _ => None,
                    };
                    if let Some(texture_type) = texture_type {
                        for (name, _) in declaration.declarators() {
                            let Some(texture) = bindings.texture(&name) else {
                                engine_bail_warn!(SOURCE, "Sampler '{}' has no binding", name);
                            };
                            out.push(format!(
                                "layout(set = 0, binding = {}) uniform {} {}_texture;\n\
                                 layout(set = 0, binding = {}) uniform sampler {}_sampler;\n",
                                texture.texture, texture_type, name, texture.sampler, name,
                            ));
                        }
                        continue;
                    }
                    for (name, count) in declaration.declarators() {
                        loose.push((type_name.clone(), name, count));
                    }
                    wrapper_at = Some(out.len());
                    continue;
                }

                let is_input = declaration.has("in");
                let is_output = declaration.has("out");
                if (is_input || is_output) && !declaration.is_block() && declaration.location().is_none() {
                    let mut layout = declaration.layout.clone();
                    for (name, count) in declaration.declarators() {
                        let span = location_span(&type_name, count);
                        let location = if is_input {
                            match varyings.get(&name) {
                                Some(&location) if stage == ShaderStageFlags::FRAGMENT => location,
                                _ => inputs.next(span),
                            }
                        } else {
                            outputs.next(span)
                        };
                        if is_output && stage == ShaderStageFlags::VERTEX {
                            varyings.insert(name.clone(), location);
                        }
                        layout.push(format!("location = {}", location));
                        // One declarator per declaration once locations are explicit
                        let single = Declaration {
                            layout: Vec::new(),
                            qualifiers: declaration.qualifiers.clone(),
                            rest: single_declarator(&declaration, &type_name, &name, count),
                        };
                        out.push(single.render(&layout));
                        layout.pop();
                    }
                    continue;
                }
                if is_output && stage == ShaderStageFlags::VERTEX {
                    if let Some(location) = declaration.location() {
                        for (name, _) in declaration.declarators() {
                            varyings.insert(name, location);
                        }
                    }
                }
                out.push(text.clone());
            }
        }
    }

    if !loose.is_empty() {
        let Some((block_name, binding)) = bindings.uniforms_block(stage) else {
            engine_bail_warn!(SOURCE, "Loose uniforms in {:?} stage have no block binding", stage);
        };
        let mut block = format!("layout(std140, set = 0, binding = {}) uniform {} {{\n", binding, block_name);
        for (type_name, name, count) in &loose {
            if *count > 1 {
                block.push_str(&format!("    {} {}[{}];\n", type_name, name, count));
            } else {
                block.push_str(&format!("    {} {};\n", type_name, name));
            }
        }
        block.push_str("};\n");
        out.insert(wrapper_at.unwrap_or(out.len()), block);
    }

    let mut source = out.concat();
    for texture in &bindings.textures {
        let constructor = match texture.resource_type {
            ShaderResourceType::Texture2D => "sampler2D",
            ShaderResourceType::TextureCube => "samplerCube",
        };
        let expression = format!("{}({}_texture, {}_sampler)", constructor, texture.name, texture.name);
        source = replace_identifier(&source, &texture.name, &expression);
    }
    source = replace_identifier(&source, "gl_VertexID", "gl_VertexIndex");
    source = replace_identifier(&source, "gl_InstanceID", "gl_InstanceIndex");

    engine_trace!(SOURCE, "Translated {:?} stage ({} loose uniforms)", stage, loose.len());
    Ok(TranslatedStage {
        source,
        loose_uniforms: loose.into_iter().map(|(_, name, _)| name).collect(),
    })
}

fn single_declarator(declaration: &Declaration, type_name: &str, name: &str, count: u32) -> Vec<String> {
    let mut rest: Vec<String> = declaration
        .rest
        .iter()
        .take_while(|t| t.as_str() != type_name)
        .cloned()
        .collect();
    rest.push(type_name.to_string());
    rest.push(name.to_string());
    if count > 1 {
        rest.extend(["[".to_string(), count.to_string(), "]".to_string()]);
    }
    rest
}

#[cfg(test)]
#[path = "vulkan_glsl_tests.rs"]
mod tests;
