// src/interp/resources.rs
//
// Runtime state for buffers, textures and atomic counters. Allocation
// follows the declared sizing strategy; clearing follows each resource's
// persistence block and is applied by the invoking command, never by the
// resource itself.
//
// Out-of-bounds buffer access is a hard error in both directions, matching
// the static literal-index checks.

use crate::error::ExecError;
use crate::ir::{
    FilterMode, IrDocument, IrType, ResourceDef, ResourceKind, SizeSpec, WrapMode,
};
use crate::value::RuntimeValue;
use serde_json::Value as Json;
use std::collections::{HashMap, HashSet};

/// Fallback extent for viewport-sized resources when no surface is attached.
pub const DEFAULT_VIEWPORT: (usize, usize) = (256, 256);

#[derive(Debug, Clone)]
pub enum ResourceState {
    Buffer {
        data: Vec<RuntimeValue>,
        element: IrType,
    },
    Texture(TextureState),
}

#[derive(Debug, Clone)]
pub struct TextureState {
    pub width: usize,
    pub height: usize,
    pub format: String,
    pub filter: FilterMode,
    pub wrap: WrapMode,
    /// Row-major RGBA texels.
    pub texels: Vec<[f64; 4]>,
}

impl TextureState {
    pub fn new(width: usize, height: usize, format: &str, filter: FilterMode, wrap: WrapMode) -> Self {
        Self {
            width,
            height,
            format: format.to_string(),
            filter,
            wrap,
            texels: vec![[0.0; 4]; width * height],
        }
    }

    /// Parse a caller-provided texture payload:
    /// `{ width, height, data: [r,g,b,a, ...], filter?, wrap? }` with data
    /// either flat or nested per texel.
    pub fn from_json(value: &Json) -> Result<TextureState, ExecError> {
        let bad = |msg: &str| ExecError::Runtime {
            node: String::new(),
            message: format!("texture payload: {msg}"),
        };
        let obj = value.as_object().ok_or_else(|| bad("expected an object"))?;
        let width = obj
            .get("width")
            .and_then(Json::as_u64)
            .ok_or_else(|| bad("missing width"))? as usize;
        let height = obj
            .get("height")
            .and_then(Json::as_u64)
            .ok_or_else(|| bad("missing height"))? as usize;
        let filter = match obj.get("filter").and_then(Json::as_str) {
            Some("linear") => FilterMode::Linear,
            _ => FilterMode::Nearest,
        };
        let wrap = match obj.get("wrap").and_then(Json::as_str) {
            Some("repeat") => WrapMode::Repeat,
            Some("mirror") => WrapMode::Mirror,
            _ => WrapMode::Clamp,
        };
        let format = obj
            .get("format")
            .and_then(Json::as_str)
            .unwrap_or("rgba32f");
        let mut texture = TextureState::new(width, height, format, filter, wrap);

        if let Some(data) = obj.get("data").and_then(Json::as_array) {
            let mut flat: Vec<f64> = Vec::with_capacity(width * height * 4);
            for item in data {
                match item {
                    Json::Array(texel) => {
                        for c in texel {
                            flat.push(c.as_f64().ok_or_else(|| bad("non-numeric component"))?);
                        }
                    }
                    other => flat.push(
                        other
                            .as_f64()
                            .ok_or_else(|| bad("non-numeric component"))?,
                    ),
                }
            }
            if flat.len() != width * height * 4 {
                return Err(bad(&format!(
                    "expected {} components, got {}",
                    width * height * 4,
                    flat.len()
                )));
            }
            for (i, texel) in texture.texels.iter_mut().enumerate() {
                texel.copy_from_slice(&flat[i * 4..i * 4 + 4]);
            }
        }
        Ok(texture)
    }

    fn wrap_index(&self, i: i64, n: usize) -> usize {
        let n_i = n as i64;
        let wrapped = match self.wrap {
            WrapMode::Clamp => i.clamp(0, n_i - 1),
            WrapMode::Repeat => i.rem_euclid(n_i),
            WrapMode::Mirror => {
                let m = i.rem_euclid(2 * n_i);
                if m < n_i {
                    m
                } else {
                    2 * n_i - 1 - m
                }
            }
        };
        wrapped as usize
    }

    fn texel(&self, x: i64, y: i64) -> [f64; 4] {
        let x = self.wrap_index(x, self.width);
        let y = self.wrap_index(y, self.height);
        self.texels[y * self.width + x]
    }

    /// Sample at normalized coordinates; [0,1] maps to texel centers at
    /// `(i + 0.5) / N`.
    pub fn sample(&self, u: f64, v: f64) -> [f64; 4] {
        if self.width == 0 || self.height == 0 {
            return [0.0; 4];
        }
        match self.filter {
            FilterMode::Nearest => {
                let x = (u * self.width as f64).floor() as i64;
                let y = (v * self.height as f64).floor() as i64;
                self.texel(x, y)
            }
            FilterMode::Linear => {
                let fx = u * self.width as f64 - 0.5;
                let fy = v * self.height as f64 - 0.5;
                let (x0, y0) = (fx.floor(), fy.floor());
                let (tx, ty) = (fx - x0, fy - y0);
                let (x0, y0) = (x0 as i64, y0 as i64);
                let mut out = [0.0; 4];
                let c00 = self.texel(x0, y0);
                let c10 = self.texel(x0 + 1, y0);
                let c01 = self.texel(x0, y0 + 1);
                let c11 = self.texel(x0 + 1, y0 + 1);
                for i in 0..4 {
                    let top = c00[i] * (1.0 - tx) + c10[i] * tx;
                    let bottom = c01[i] * (1.0 - tx) + c11[i] * tx;
                    out[i] = top * (1.0 - ty) + bottom * ty;
                }
                out
            }
        }
    }

    /// Integer texel read; indices wrap like sampling does.
    pub fn load(&self, x: i64, y: i64) -> [f64; 4] {
        if self.width == 0 || self.height == 0 {
            return [0.0; 4];
        }
        self.texel(x, y)
    }

    /// Integer texel write. Out-of-range writes are dropped.
    pub fn store(&mut self, x: i64, y: i64, color: [f64; 4]) {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            log::trace!("texture store outside extent: ({x}, {y})");
            return;
        }
        self.texels[y as usize * self.width + x as usize] = color;
    }

    fn clear(&mut self, value: Option<&Json>) {
        let color = clear_color(value);
        self.texels.fill(color);
    }
}

fn clear_color(value: Option<&Json>) -> [f64; 4] {
    let mut color = [0.0; 4];
    if let Some(Json::Array(items)) = value {
        for (slot, item) in color.iter_mut().zip(items) {
            *slot = item.as_f64().unwrap_or(0.0);
        }
    }
    color
}

// ============================================================================
// RESOURCE TABLE
// ============================================================================

#[derive(Debug)]
pub struct ResourceTable {
    states: HashMap<String, ResourceState>,
    viewport: (usize, usize),
    /// Names mutated since the last `take_dirty`, for the tool entry point.
    dirty: HashSet<String>,
}

impl ResourceTable {
    /// Allocate every declared resource at its initial size, cleared.
    pub fn from_document(doc: &IrDocument) -> Result<ResourceTable, ExecError> {
        let mut table = ResourceTable {
            states: HashMap::new(),
            viewport: DEFAULT_VIEWPORT,
            dirty: HashSet::new(),
        };
        for def in &doc.resources {
            let state = table.allocate(doc, def)?;
            table.states.insert(def.id.clone(), state);
        }
        Ok(table)
    }

    fn allocate(&self, doc: &IrDocument, def: &ResourceDef) -> Result<ResourceState, ExecError> {
        match def.kind {
            ResourceKind::Buffer | ResourceKind::Atomic => {
                let element = match &def.element_type {
                    Some(ty) => IrType::parse(ty)
                        .ok_or_else(|| ExecError::UnknownResource(ty.clone()))?,
                    None => IrType::Int,
                };
                let len = match def.size {
                    SizeSpec::Fixed(n) => n as usize,
                    _ => 0,
                };
                let zero = match &def.persistence.clear_value {
                    Some(v) => RuntimeValue::from_json_typed(v, &element, doc)?,
                    None => RuntimeValue::zero_of(&element, doc)?,
                };
                Ok(ResourceState::Buffer {
                    data: vec![zero; len],
                    element,
                })
            }
            ResourceKind::Texture => {
                let (width, height) = self.extent_of(&def.size);
                let mut texture = TextureState::new(
                    width,
                    height,
                    def.format.as_deref().unwrap_or("rgba32f"),
                    def.filter.unwrap_or_default(),
                    def.wrap.unwrap_or_default(),
                );
                texture.clear(def.persistence.clear_value.as_ref());
                Ok(ResourceState::Texture(texture))
            }
        }
    }

    fn extent_of(&self, size: &SizeSpec) -> (usize, usize) {
        match size {
            SizeSpec::Extent { width, height } => (*width as usize, *height as usize),
            SizeSpec::Viewport { viewport } => (
                ((self.viewport.0 as f64) * viewport).round().max(1.0) as usize,
                ((self.viewport.1 as f64) * viewport).round().max(1.0) as usize,
            ),
            SizeSpec::Fixed(_) => (0, 0),
        }
    }

    /// Register a caller-provided texture under an input id.
    pub fn bind_texture(&mut self, id: &str, texture: TextureState) {
        self.states.insert(id.to_string(), ResourceState::Texture(texture));
    }

    pub fn state(&self, name: &str) -> Option<&ResourceState> {
        self.states.get(name)
    }

    pub fn buffer(&self, name: &str) -> Option<&[RuntimeValue]> {
        match self.states.get(name)? {
            ResourceState::Buffer { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn texture(&self, name: &str) -> Option<&TextureState> {
        match self.states.get(name)? {
            ResourceState::Texture(t) => Some(t),
            _ => None,
        }
    }

    pub fn texture_mut(&mut self, name: &str) -> Result<&mut TextureState, ExecError> {
        self.dirty.insert(name.to_string());
        match self.states.get_mut(name) {
            Some(ResourceState::Texture(t)) => Ok(t),
            Some(_) => Err(ExecError::Runtime {
                node: String::new(),
                message: format!("resource '{name}' is not a texture"),
            }),
            None => Err(ExecError::UnknownResource(name.to_string())),
        }
    }

    pub fn buffer_load(&self, name: &str, index: i64) -> Result<RuntimeValue, ExecError> {
        match self.states.get(name) {
            Some(ResourceState::Buffer { data, .. }) => {
                if index < 0 || index as usize >= data.len() {
                    return Err(ExecError::BufferLoadOob {
                        buffer: name.to_string(),
                        index,
                        len: data.len(),
                    });
                }
                Ok(data[index as usize].clone())
            }
            Some(_) => Err(ExecError::Runtime {
                node: String::new(),
                message: format!("resource '{name}' is not a buffer"),
            }),
            None => Err(ExecError::UnknownResource(name.to_string())),
        }
    }

    pub fn buffer_store(
        &mut self,
        name: &str,
        index: i64,
        value: RuntimeValue,
    ) -> Result<(), ExecError> {
        match self.states.get_mut(name) {
            Some(ResourceState::Buffer { data, .. }) => {
                if index < 0 || index as usize >= data.len() {
                    return Err(ExecError::BufferStoreOob {
                        buffer: name.to_string(),
                        index,
                        len: data.len(),
                    });
                }
                data[index as usize] = value;
                self.dirty.insert(name.to_string());
                Ok(())
            }
            Some(_) => Err(ExecError::Runtime {
                node: String::new(),
                message: format!("resource '{name}' is not a buffer"),
            }),
            None => Err(ExecError::UnknownResource(name.to_string())),
        }
    }

    /// Size as seen by `resource_get_size`: element count for buffers,
    /// (width, height) for textures.
    pub fn size_of(&self, name: &str) -> Result<RuntimeValue, ExecError> {
        match self.states.get(name) {
            Some(ResourceState::Buffer { data, .. }) => Ok(RuntimeValue::Int(data.len() as i64)),
            Some(ResourceState::Texture(t)) => Ok(RuntimeValue::Vector(vec![
                t.width as f64,
                t.height as f64,
            ])),
            None => Err(ExecError::UnknownResource(name.to_string())),
        }
    }

    pub fn format_of(&self, name: &str) -> Result<RuntimeValue, ExecError> {
        match self.states.get(name) {
            Some(ResourceState::Buffer { element, .. }) => {
                Ok(RuntimeValue::Str(element.to_string()))
            }
            Some(ResourceState::Texture(t)) => Ok(RuntimeValue::Str(t.format.clone())),
            None => Err(ExecError::UnknownResource(name.to_string())),
        }
    }

    /// `cmd_resize_resource`: mutate dimensions, optionally the format, and
    /// apply the clear rules from the persistence block.
    pub fn resize(
        &mut self,
        doc: &IrDocument,
        name: &str,
        new_size: &RuntimeValue,
        new_format: Option<&str>,
    ) -> Result<(), ExecError> {
        let def = doc
            .resource(name)
            .ok_or_else(|| ExecError::UnknownResource(name.to_string()))?;
        self.dirty.insert(name.to_string());
        match self.states.get_mut(name) {
            Some(ResourceState::Buffer { data, element }) => {
                let len = new_size.as_i64()?.max(0) as usize;
                let zero = RuntimeValue::zero_of(element, doc)?;
                data.resize(len, zero.clone());
                if def.persistence.clear_on_resize {
                    data.fill(zero);
                }
                Ok(())
            }
            Some(ResourceState::Texture(texture)) => {
                let extent = new_size.as_vector()?;
                if extent.len() != 2 {
                    return Err(ExecError::Runtime {
                        node: String::new(),
                        message: "texture resize expects a 2-component extent".into(),
                    });
                }
                let (width, height) = (extent[0].max(0.0) as usize, extent[1].max(0.0) as usize);
                let mut resized = TextureState::new(
                    width,
                    height,
                    new_format.unwrap_or(&texture.format),
                    texture.filter,
                    texture.wrap,
                );
                if def.persistence.clear_on_resize {
                    resized.clear(def.persistence.clear_value.as_ref());
                } else {
                    // keep the overlapping region
                    for y in 0..height.min(texture.height) {
                        for x in 0..width.min(texture.width) {
                            resized.texels[y * width + x] = texture.texels[y * texture.width + x];
                        }
                    }
                }
                *texture = resized;
                Ok(())
            }
            None => Err(ExecError::UnknownResource(name.to_string())),
        }
    }

    pub fn clear(
        &mut self,
        doc: &IrDocument,
        name: &str,
        value: Option<&Json>,
    ) -> Result<(), ExecError> {
        self.dirty.insert(name.to_string());
        match self.states.get_mut(name) {
            Some(ResourceState::Buffer { data, element }) => {
                let fill = match value {
                    Some(v) => RuntimeValue::from_json_typed(v, element, doc)?,
                    None => RuntimeValue::zero_of(element, doc)?,
                };
                data.fill(fill);
                Ok(())
            }
            Some(ResourceState::Texture(texture)) => {
                texture.clear(value);
                Ok(())
            }
            None => Err(ExecError::UnknownResource(name.to_string())),
        }
    }

    /// Frame-start clearing for every non-persistent resource.
    pub fn begin_frame(&mut self, doc: &IrDocument) -> Result<(), ExecError> {
        for def in &doc.resources {
            if !def.persistence.persistent {
                self.clear(doc, &def.id, def.persistence.clear_value.as_ref())?;
            }
        }
        self.dirty.clear();
        Ok(())
    }

    pub fn take_dirty(&mut self) -> Vec<String> {
        let mut names: Vec<String> = self.dirty.drain().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn checker_2x2(filter: FilterMode, wrap: WrapMode) -> TextureState {
        let mut t = TextureState::new(2, 2, "rgba32f", filter, wrap);
        // rows: [red, green], [blue, white]
        t.texels = vec![
            [1.0, 0.0, 0.0, 1.0],
            [0.0, 1.0, 0.0, 1.0],
            [0.0, 0.0, 1.0, 1.0],
            [1.0, 1.0, 1.0, 1.0],
        ];
        t
    }

    #[test]
    fn nearest_repeat_wraps_around() {
        let t = checker_2x2(FilterMode::Nearest, WrapMode::Repeat);
        assert_eq!(t.sample(1.5, 0.5), [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn nearest_clamp_pins_to_edge() {
        let t = checker_2x2(FilterMode::Nearest, WrapMode::Clamp);
        assert_eq!(t.sample(-0.5, 0.5), [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn mirror_reflects() {
        let t = checker_2x2(FilterMode::Nearest, WrapMode::Mirror);
        // u = 1.25 -> texel index 2 -> mirrored back to 1
        assert_eq!(t.sample(1.25, 0.25), t.sample(0.75, 0.25));
    }

    #[test]
    fn linear_filter_blends_texel_centers() {
        let mut t = TextureState::new(2, 1, "rgba32f", FilterMode::Linear, WrapMode::Clamp);
        t.texels = vec![[0.0, 0.0, 0.0, 1.0], [1.0, 1.0, 1.0, 1.0]];
        // halfway between the two texel centers
        let c = t.sample(0.5, 0.5);
        assert!((c[0] - 0.5).abs() < 1e-9);
        // dead on the left texel center
        let c = t.sample(0.25, 0.5);
        assert!(c[0].abs() < 1e-9);
    }

    #[test]
    fn texture_payload_parsing() {
        let t = TextureState::from_json(&json!({
            "width": 2, "height": 2, "wrap": "repeat",
            "data": [[1,0,0,1],[0,1,0,1],[0,0,1,1],[1,1,1,1]]
        }))
        .unwrap();
        assert_eq!(t.wrap, WrapMode::Repeat);
        assert_eq!(t.texels[3], [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn buffer_oob_is_hard_both_ways() {
        let doc = crate::ir::IrDocument::from_json(json!({
            "version": "1", "meta": {"name": "t"}, "entryPoint": "main",
            "resources": [{"id": "b", "kind": "buffer", "elementType": "int", "size": 4}],
            "functions": [{"id": "main", "kind": "cpu"}]
        }))
        .unwrap();
        let mut table = ResourceTable::from_document(&doc).unwrap();
        assert!(table.buffer_load("b", 3).is_ok());
        assert!(matches!(
            table.buffer_load("b", 4),
            Err(ExecError::BufferLoadOob { .. })
        ));
        assert!(matches!(
            table.buffer_store("b", -1, RuntimeValue::Int(0)),
            Err(ExecError::BufferStoreOob { .. })
        ));
    }
}
