/// GLSL uniform reflection.
///
/// Scans GLSL source at shader-load time and produces a `ShaderReflection`:
/// - `struct` definitions (one nesting level),
/// - `uniform TYPE name[N];` loose uniforms,
/// - `uniform Block { ... } instance;` blocks, with `layout(std140)` and
///   `layout(binding = N)` honoured,
/// - `uniform sampler2D` / `samplerCube` resources.
///
/// Comments and preprocessor lines are ignored. Everything else (inputs,
/// outputs, functions) is skipped. Unknown uniform types fail with
/// `Error::UnknownShaderType`.

use rustc_hash::FxHashMap;
use crate::error::Result;
use crate::render::shader_uniform::{
    ShaderReflection, ShaderResourceDeclaration, ShaderResourceType, ShaderStageFlags,
    ShaderStruct, ShaderUniformBufferDeclaration, ShaderUniformDeclaration, UniformPacking,
    UniformType,
};
use crate::{engine_bail_warn, engine_debug, engine_warn};

const SOURCE: &str = "aurora::GlslReflect";

/// Reflect a single stage
pub fn reflect_glsl(stage: ShaderStageFlags, source: &str, packing: UniformPacking) -> Result<ShaderReflection> {
    let mut reflector = GlslReflector::new(packing);
    reflector.reflect_stage(stage, source)?;
    Ok(reflector.finish())
}

/// Reflect a vertex + fragment pair into one merged reflection
pub fn reflect_glsl_program(vertex: &str, fragment: &str, packing: UniformPacking) -> Result<ShaderReflection> {
    let mut reflector = GlslReflector::new(packing);
    reflector.reflect_stage(ShaderStageFlags::VERTEX, vertex)?;
    reflector.reflect_stage(ShaderStageFlags::FRAGMENT, fragment)?;
    Ok(reflector.finish())
}

// ===== SOURCE PREPARATION =====

/// Remove comments and preprocessor lines, keeping line structure
fn strip_source(source: &str) -> String {
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
                if last == '*' && c == '/' {
                    break;
                }
                if c == '\n' {
                    out.push('\n');
                }
                last = c;
            }
            out.push(' ');
        } else {
            out.push(c);
        }
    }

    out.lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
}

fn tokenize(source: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (i, c) in source.char_indices() {
        if c.is_alphanumeric() || c == '_' || c == '.' {
            if start.is_none() {
                start = Some(i);
            }
            continue;
        }
        if let Some(s) = start.take() {
            tokens.push(&source[s..i]);
        }
        if !c.is_whitespace() {
            tokens.push(&source[i..i + c.len_utf8()]);
        }
    }
    if let Some(s) = start {
        tokens.push(&source[s..]);
    }
    tokens
}

struct Cursor<'a> {
    tokens: Vec<&'a str>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<&'a str> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect(&mut self, token: &str) -> Result<()> {
        match self.next() {
            Some(found) if found == token => Ok(()),
            found => {
                engine_bail_warn!(SOURCE, "Expected '{}', found '{}'",
                    token, found.unwrap_or("end of source"));
            }
        }
    }

    fn identifier(&mut self) -> Result<&'a str> {
        match self.next() {
            Some(token) if token.starts_with(|c: char| c.is_alphabetic() || c == '_') => Ok(token),
            found => {
                engine_bail_warn!(SOURCE, "Expected identifier, found '{}'",
                    found.unwrap_or("end of source"));
            }
        }
    }

    /// Skip a balanced `{ ... }` group, cursor on the opening brace
    fn skip_braces(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.next() {
            match token {
                "{" => depth += 1,
                "}" => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    /// Skip to the end of a declaration or a function body
    fn skip_statement(&mut self) {
        while let Some(token) = self.peek() {
            match token {
                ";" => {
                    self.pos += 1;
                    return;
                }
                "{" => {
                    self.skip_braces();
                    self.eat(";");
                    return;
                }
                _ => self.pos += 1,
            }
        }
    }
}

fn is_precision(token: &str) -> bool {
    matches!(token, "highp" | "mediump" | "lowp")
}

// ===== LAYOUT QUALIFIERS =====

#[derive(Debug, Default, Clone, Copy)]
struct LayoutQualifiers {
    binding: Option<u32>,
    std140: bool,
}

fn parse_layout(cursor: &mut Cursor<'_>) -> Result<LayoutQualifiers> {
    let mut layout = LayoutQualifiers::default();
    cursor.expect("(")?;
    loop {
        let name = cursor.identifier()?;
        let value = if cursor.eat("=") {
            Some(parse_count(cursor.next(), name)?)
        } else {
            None
        };
        match (name, value) {
            ("binding", Some(binding)) => layout.binding = Some(binding),
            ("std140", None) => layout.std140 = true,
            _ => {}
        }
        if cursor.eat(")") {
            return Ok(layout);
        }
        cursor.expect(",")?;
    }
}

fn parse_count(token: Option<&str>, what: &str) -> Result<u32> {
    match token.and_then(|t| t.parse::<u32>().ok()) {
        Some(value) => Ok(value),
        None => {
            engine_bail_warn!(SOURCE, "Expected an integer literal for '{}', found '{}'",
                what, token.unwrap_or("end of source"));
        }
    }
}

/// `name [N]? (, name [N]?)* ;`
fn parse_declarators(cursor: &mut Cursor<'_>) -> Result<Vec<(String, u32)>> {
    let mut declarators = Vec::new();
    loop {
        let name = cursor.identifier()?;
        let count = if cursor.eat("[") {
            let count = parse_count(cursor.next(), name)?;
            cursor.expect("]")?;
            count
        } else {
            1
        };
        declarators.push((name.to_string(), count));
        if cursor.eat(";") {
            return Ok(declarators);
        }
        cursor.expect(",")?;
    }
}

fn parse_type(name: &str) -> Result<UniformType> {
    UniformType::from_name(name).map_err(|e| {
        engine_warn!(SOURCE, "Unknown uniform type '{}'", name);
        e
    })
}

// ===== REFLECTOR =====

/// Struct definition before a packing is applied
#[derive(Debug, Clone)]
struct StructDef {
    name: String,
    fields: Vec<(UniformType, String, u32)>,
}

impl StructDef {
    fn build(&self, packing: UniformPacking, stage: ShaderStageFlags) -> ShaderStruct {
        let mut shader_struct = ShaderStruct::with_packing(self.name.clone(), packing);
        for (ty, name, count) in &self.fields {
            shader_struct.add_field(ShaderUniformDeclaration::new(*ty, name.clone(), *count).with_stage(stage));
        }
        shader_struct
    }
}

/// Accumulates declarations across the stages of one program
pub struct GlslReflector {
    packing: UniformPacking,
    reflection: ShaderReflection,
    structs: FxHashMap<String, StructDef>,
    next_register: u32,
    next_resource_register: u32,
}

impl GlslReflector {
    /// `packing` applies to blocks without an explicit `std140` qualifier
    pub fn new(packing: UniformPacking) -> Self {
        Self {
            packing,
            reflection: ShaderReflection::default(),
            structs: FxHashMap::default(),
            next_register: 0,
            next_resource_register: 0,
        }
    }

    /// Add the declarations of one stage
    ///
    /// A block or uniform already declared by an earlier stage is widened
    /// to this stage rather than duplicated.
    pub fn reflect_stage(&mut self, stage: ShaderStageFlags, source: &str) -> Result<()> {
        let stripped = strip_source(source);
        let mut cursor = Cursor { tokens: tokenize(&stripped), pos: 0 };
        self.structs.clear();

        let mut layout = LayoutQualifiers::default();
        while let Some(token) = cursor.peek() {
            match token {
                "layout" => {
                    cursor.next();
                    layout = parse_layout(&mut cursor)?;
                    continue;
                }
                "struct" => {
                    cursor.next();
                    self.parse_struct(&mut cursor)?;
                }
                "uniform" => {
                    cursor.next();
                    self.parse_uniform(&mut cursor, layout, stage)?;
                }
                _ => cursor.skip_statement(),
            }
            layout = LayoutQualifiers::default();
        }

        engine_debug!(SOURCE, "Reflected {:?}: {} blocks, {} uniforms, {} resources",
            stage,
            self.reflection.uniform_buffers.len(),
            self.reflection.uniforms.len(),
            self.reflection.resources.len());
        Ok(())
    }

    pub fn finish(self) -> ShaderReflection {
        self.reflection
    }

    fn parse_struct(&mut self, cursor: &mut Cursor<'_>) -> Result<()> {
        let name = cursor.identifier()?.to_string();
        cursor.expect("{")?;
        let mut fields = Vec::new();
        while !cursor.eat("}") {
            let mut type_name = cursor.identifier()?;
            if is_precision(type_name) {
                type_name = cursor.identifier()?;
            }
            if self.structs.contains_key(type_name) {
                engine_bail_warn!(SOURCE,
                    "Struct '{}' nests struct '{}' (one level supported)", name, type_name);
            }
            let ty = parse_type(type_name)?;
            for (field, count) in parse_declarators(cursor)? {
                fields.push((ty, field, count));
            }
        }

        // `struct Light { .. } u_Light;` outside a uniform declaration is not a uniform
        if !cursor.eat(";") {
            cursor.skip_statement();
        }
        self.structs.insert(name.clone(), StructDef { name, fields });
        Ok(())
    }

    fn member(&self, type_name: &str, name: String, count: u32, packing: UniformPacking, stage: ShaderStageFlags)
        -> Result<ShaderUniformDeclaration>
    {
        let declaration = match self.structs.get(type_name) {
            Some(def) => ShaderUniformDeclaration::new_struct(def.build(packing, stage), name, count),
            None => ShaderUniformDeclaration::new(parse_type(type_name)?, name, count),
        };
        Ok(declaration.with_stage(stage))
    }

    fn parse_uniform(&mut self, cursor: &mut Cursor<'_>, layout: LayoutQualifiers, stage: ShaderStageFlags) -> Result<()> {
        let mut type_name = cursor.identifier()?;
        if is_precision(type_name) {
            type_name = cursor.identifier()?;
        }

        if cursor.peek() == Some("{") {
            return self.parse_block(cursor, type_name, layout, stage);
        }

        let resource_type = match type_name {
            "sampler2D" => Some(ShaderResourceType::Texture2D),
            "samplerCube" => Some(ShaderResourceType::TextureCube),
            _ => None,
        };
        let declarators = parse_declarators(cursor)?;

        if let Some(resource_type) = resource_type {
            for (name, count) in declarators {
                self.add_resource(name, resource_type, count, layout.binding);
            }
            return Ok(());
        }

        for (name, count) in declarators {
            if let Some(existing) = self.reflection.uniforms.iter_mut().find(|u| u.name() == name) {
                existing.add_stage(stage);
                continue;
            }
            let uniform = self.member(type_name, name, count, UniformPacking::Tight, stage)?;
            self.reflection.uniforms.push(uniform);
        }
        Ok(())
    }

    fn parse_block(&mut self, cursor: &mut Cursor<'_>, block_name: &str, layout: LayoutQualifiers, stage: ShaderStageFlags)
        -> Result<()>
    {
        let packing = if layout.std140 { UniformPacking::Std140 } else { self.packing };
        let existing = self.reflection.uniform_buffers.iter().position(|b| b.name() == block_name);
        let register = match existing {
            Some(index) => self.reflection.uniform_buffers[index].register(),
            None => self.assign_register(layout.binding),
        };
        let mut block = ShaderUniformBufferDeclaration::new(block_name, register, stage).with_packing(packing);

        cursor.expect("{")?;
        while !cursor.eat("}") {
            if cursor.eat("layout") {
                parse_layout(cursor)?;
            }
            let mut type_name = cursor.identifier()?;
            if is_precision(type_name) {
                type_name = cursor.identifier()?;
            }
            for (name, count) in parse_declarators(cursor)? {
                let member = self.member(type_name, name, count, packing, stage)?;
                block.push_uniform(member);
            }
        }

        // Optional instance name
        if !cursor.eat(";") {
            parse_declarators(cursor)?;
        }

        match existing {
            Some(index) => {
                let existing = &mut self.reflection.uniform_buffers[index];
                if existing.uniforms().len() != block.uniforms().len() {
                    engine_warn!(SOURCE,
                        "Block '{}' differs between stages ({} vs {} members)",
                        block_name, existing.uniforms().len(), block.uniforms().len());
                }
                existing.add_stage(stage);
            }
            None => self.reflection.uniform_buffers.push(block),
        }
        Ok(())
    }

    fn assign_register(&mut self, binding: Option<u32>) -> u32 {
        match binding {
            Some(binding) => {
                self.next_register = self.next_register.max(binding + 1);
                binding
            }
            None => {
                let register = self.next_register;
                self.next_register += 1;
                register
            }
        }
    }

    fn add_resource(&mut self, name: String, resource_type: ShaderResourceType, count: u32, binding: Option<u32>) {
        if self.reflection.resources.iter().any(|r| r.name == name) {
            return;
        }
        let register = match binding {
            Some(binding) => {
                self.next_resource_register = self.next_resource_register.max(binding + count);
                binding
            }
            None => {
                let register = self.next_resource_register;
                self.next_resource_register += count;
                register
            }
        };
        self.reflection.resources.push(ShaderResourceDeclaration { name, resource_type, register, count });
    }
}

#[cfg(test)]
#[path = "glsl_reflect_tests.rs"]
mod tests;
