//! GL draw layer: the warped, textured mesh and the point-editing overlay.
//!
//! Mesh coordinates are display space `[0,1]²` with y up; the vertex shader maps
//! them to clip space. Texture coordinates are the mesh's parametric (s,t) plus
//! the scene offset, sampled with `GL_REPEAT` so offsets wrap.

use std::rc::Rc;

use anyhow::{anyhow, Result};
use glow::HasContext;

use warpeye_engine::texture::TextureHandle;
use warpeye_engine::warp::{Mesh, POINT_OFFSET};

const VERT_SRC: &str = r#"#version 330 core
layout(location = 0) in vec2 a_pos;
layout(location = 1) in vec2 a_uv;

uniform vec2 u_offset;
uniform float u_invert_x;

out vec2 v_uv;

void main() {
    vec2 uv = a_uv;
    if (u_invert_x > 0.5) {
        uv.x = 1.0 - uv.x;
    }
    v_uv = uv + u_offset;
    gl_Position = vec4(a_pos * 2.0 - 1.0, 0.0, 1.0);
}
"#;

const FRAG_SRC: &str = r#"#version 330 core
in vec2 v_uv;

uniform sampler2D u_tex;
uniform float u_textured;
uniform vec4 u_color;

out vec4 o_color;

void main() {
    o_color = u_textured > 0.5 ? texture(u_tex, v_uv) : u_color;
}
"#;

// x, y, s, t
const FLOATS_PER_VERTEX: usize = 4;

const SOURCE_COLOR: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
const POINT_COLOR: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
const SELECTED_COLOR: [f32; 4] = [1.0, 0.0, 1.0, 1.0];

/// Two triangles per grid cell, `[x, y, s, t]` per vertex.
pub fn mesh_triangles(mesh: &Mesh) -> Vec<f32> {
    let cells = (mesh.cols() - 1) * (mesh.rows() - 1);
    let mut out = Vec::with_capacity(cells * 6 * FLOATS_PER_VERTEX);
    let mut push = |col: usize, row: usize| {
        let [x, y] = mesh.get(col, row);
        let [s, t] = mesh.tex_coord(col, row);
        out.extend_from_slice(&[x, y, s, t]);
    };
    for row in 0..mesh.rows() - 1 {
        for col in 0..mesh.cols() - 1 {
            push(col, row);
            push(col + 1, row);
            push(col + 1, row + 1);

            push(col, row);
            push(col + 1, row + 1);
            push(col, row + 1);
        }
    }
    out
}

/// Outline of one vertex's pick box as 4 line segments.
pub fn pick_box_lines(center: [f32; 2], display_aspect: f32) -> [f32; 32] {
    let rx = POINT_OFFSET;
    let ry = POINT_OFFSET * display_aspect;
    let [cx, cy] = center;
    let corners = [
        [cx - rx, cy - ry],
        [cx - rx, cy + ry],
        [cx + rx, cy + ry],
        [cx + rx, cy - ry],
    ];
    let mut out = [0.0; 32];
    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        out[i * 8..i * 8 + 8].copy_from_slice(&[a[0], a[1], 0.0, 0.0, b[0], b[1], 0.0, 0.0]);
    }
    out
}

/// Line vertices for the point overlay, one batch per color.
#[derive(Debug, Default)]
pub struct Overlay {
    /// Boxes on the unwarped grid.
    pub source: Vec<f32>,
    /// Boxes on the warped vertices, minus the selected one.
    pub warped: Vec<f32>,
    pub selected: Vec<f32>,
}

pub fn overlay_lines(mesh: &Mesh, display_aspect: f32, selected: Option<(usize, usize)>) -> Overlay {
    let count = mesh.points().len() * 32;
    let mut out = Overlay {
        source: Vec::with_capacity(count),
        warped: Vec::with_capacity(count),
        selected: Vec::new(),
    };
    for row in 0..mesh.rows() {
        for col in 0..mesh.cols() {
            out.source
                .extend_from_slice(&pick_box_lines(mesh.tex_coord(col, row), display_aspect));
            let lines = pick_box_lines(mesh.get(col, row), display_aspect);
            if selected == Some((col, row)) {
                out.selected.extend_from_slice(&lines);
            } else {
                out.warped.extend_from_slice(&lines);
            }
        }
    }
    out
}

fn as_bytes(data: &[f32]) -> &[u8] {
    // SAFETY: f32 has no padding and u8 has alignment 1.
    unsafe { core::slice::from_raw_parts(data.as_ptr() as *const u8, std::mem::size_of_val(data)) }
}

/// Per-frame draw inputs.
pub struct DrawParams {
    pub texture: TextureHandle,
    pub offset: (f32, f32),
    pub invert_x: bool,
    pub viewport: (i32, i32),
}

pub struct Renderer {
    gl: Rc<glow::Context>,
    program: glow::NativeProgram,
    mesh_vao: glow::NativeVertexArray,
    mesh_vbo: glow::NativeBuffer,
    mesh_vertices: i32,
    overlay_vao: glow::NativeVertexArray,
    overlay_vbo: glow::NativeBuffer,
}

unsafe fn compile_program(gl: &glow::Context, vert_src: &str, frag_src: &str) -> Result<glow::NativeProgram> {
    let vs = gl.create_shader(glow::VERTEX_SHADER).map_err(|e| anyhow!("create_shader: {e}"))?;
    gl.shader_source(vs, vert_src);
    gl.compile_shader(vs);
    if !gl.get_shader_compile_status(vs) {
        return Err(anyhow!("vertex shader compile error:\n{}", gl.get_shader_info_log(vs)));
    }

    let fs = gl.create_shader(glow::FRAGMENT_SHADER).map_err(|e| anyhow!("create_shader: {e}"))?;
    gl.shader_source(fs, frag_src);
    gl.compile_shader(fs);
    if !gl.get_shader_compile_status(fs) {
        return Err(anyhow!("fragment shader compile error:\n{}", gl.get_shader_info_log(fs)));
    }

    let program = gl.create_program().map_err(|e| anyhow!("create_program: {e}"))?;
    gl.attach_shader(program, vs);
    gl.attach_shader(program, fs);
    gl.link_program(program);
    if !gl.get_program_link_status(program) {
        return Err(anyhow!("program link error:\n{}", gl.get_program_info_log(program)));
    }

    gl.detach_shader(program, vs);
    gl.detach_shader(program, fs);
    gl.delete_shader(vs);
    gl.delete_shader(fs);

    Ok(program)
}

unsafe fn vertex_buffer(gl: &glow::Context) -> Result<(glow::NativeVertexArray, glow::NativeBuffer)> {
    let vao = gl.create_vertex_array().map_err(|e| anyhow!("create_vertex_array: {e}"))?;
    let vbo = gl.create_buffer().map_err(|e| anyhow!("create_buffer: {e}"))?;

    gl.bind_vertex_array(Some(vao));
    gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));

    let stride = (FLOATS_PER_VERTEX * std::mem::size_of::<f32>()) as i32;
    gl.enable_vertex_attrib_array(0);
    gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, stride, 0);
    gl.enable_vertex_attrib_array(1);
    gl.vertex_attrib_pointer_f32(1, 2, glow::FLOAT, false, stride, 2 * 4);

    gl.bind_buffer(glow::ARRAY_BUFFER, None);
    gl.bind_vertex_array(None);
    Ok((vao, vbo))
}

impl Renderer {
    pub fn new(gl: Rc<glow::Context>) -> Result<Self> {
        unsafe {
            let program = compile_program(&gl, VERT_SRC, FRAG_SRC)?;
            let (mesh_vao, mesh_vbo) = vertex_buffer(&gl)?;
            let (overlay_vao, overlay_vbo) = vertex_buffer(&gl)?;
            Ok(Self {
                gl,
                program,
                mesh_vao,
                mesh_vbo,
                mesh_vertices: 0,
                overlay_vao,
                overlay_vbo,
            })
        }
    }

    /// Replace the geometry drawn by [`Renderer::draw_mesh`].
    pub fn upload_mesh(&mut self, mesh: &Mesh) {
        let verts = mesh_triangles(mesh);
        self.mesh_vertices = (verts.len() / FLOATS_PER_VERTEX) as i32;
        unsafe {
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.mesh_vbo));
            self.gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, as_bytes(&verts), glow::DYNAMIC_DRAW);
            self.gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }
    }

    fn set_uniforms(&self, textured: bool, color: [f32; 4], offset: (f32, f32), invert_x: bool) {
        let gl = &self.gl;
        let p = self.program;
        unsafe {
            if let Some(loc) = gl.get_uniform_location(p, "u_textured") {
                gl.uniform_1_f32(Some(&loc), if textured { 1.0 } else { 0.0 });
            }
            if let Some(loc) = gl.get_uniform_location(p, "u_color") {
                gl.uniform_4_f32(Some(&loc), color[0], color[1], color[2], color[3]);
            }
            if let Some(loc) = gl.get_uniform_location(p, "u_offset") {
                gl.uniform_2_f32(Some(&loc), offset.0, offset.1);
            }
            if let Some(loc) = gl.get_uniform_location(p, "u_invert_x") {
                gl.uniform_1_f32(Some(&loc), if invert_x { 1.0 } else { 0.0 });
            }
            if let Some(loc) = gl.get_uniform_location(p, "u_tex") {
                gl.uniform_1_i32(Some(&loc), 0);
            }
        }
    }

    /// Clear and draw the textured mesh. A `NONE` texture leaves the frame black.
    pub fn draw_mesh(&self, params: &DrawParams) {
        let gl = &self.gl;
        unsafe {
            gl.viewport(0, 0, params.viewport.0, params.viewport.1);
            gl.clear_color(0.0, 0.0, 0.0, 1.0);
            gl.clear(glow::COLOR_BUFFER_BIT);

            let Some(tex) = std::num::NonZeroU32::new(params.texture.0).map(glow::NativeTexture) else {
                return;
            };

            gl.use_program(Some(self.program));
            self.set_uniforms(true, [1.0; 4], params.offset, params.invert_x);
            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, Some(tex));

            gl.bind_vertex_array(Some(self.mesh_vao));
            gl.draw_arrays(glow::TRIANGLES, 0, self.mesh_vertices);

            gl.bind_vertex_array(None);
            gl.bind_texture(glow::TEXTURE_2D, None);
            gl.use_program(None);
        }
    }

    /// Source grid in red, warped vertices in green, `selected` in magenta.
    pub fn draw_points(&self, mesh: &Mesh, display_aspect: f32, selected: Option<(usize, usize)>) {
        let overlay = overlay_lines(mesh, display_aspect, selected);

        let gl = &self.gl;
        unsafe {
            gl.use_program(Some(self.program));
            gl.bind_vertex_array(Some(self.overlay_vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.overlay_vbo));
            let batches = [
                (&overlay.source, SOURCE_COLOR),
                (&overlay.warped, POINT_COLOR),
                (&overlay.selected, SELECTED_COLOR),
            ];
            for (verts, color) in batches {
                if verts.is_empty() {
                    continue;
                }
                self.set_uniforms(false, color, (0.0, 0.0), false);
                gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, as_bytes(verts), glow::STREAM_DRAW);
                gl.draw_arrays(glow::LINES, 0, (verts.len() / FLOATS_PER_VERTEX) as i32);
            }
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
            gl.bind_vertex_array(None);
            gl.use_program(None);
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        unsafe {
            self.gl.delete_buffer(self.overlay_vbo);
            self.gl.delete_vertex_array(self.overlay_vao);
            self.gl.delete_buffer(self.mesh_vbo);
            self.gl.delete_vertex_array(self.mesh_vao);
            self.gl.delete_program(self.program);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_mesh_triangulates_every_cell() {
        let mesh = Mesh::identity(2);
        let verts = mesh_triangles(&mesh);
        // 3x3 vertices -> 4 cells -> 8 triangles
        assert_eq!(verts.len(), 4 * 6 * FLOATS_PER_VERTEX);
        // on the identity warp, position and texture coordinate agree
        for v in verts.chunks(FLOATS_PER_VERTEX) {
            assert_eq!([v[0], v[1]], [v[2], v[3]]);
        }
    }

    #[test]
    fn pick_box_is_aspect_corrected() {
        let lines = pick_box_lines([0.5, 0.5], 2.0);
        let xs: Vec<f32> = lines.chunks(4).map(|v| v[0]).collect();
        let ys: Vec<f32> = lines.chunks(4).map(|v| v[1]).collect();
        let width = xs.iter().cloned().fold(f32::MIN, f32::max) - xs.iter().cloned().fold(f32::MAX, f32::min);
        let height = ys.iter().cloned().fold(f32::MIN, f32::max) - ys.iter().cloned().fold(f32::MAX, f32::min);
        assert!((width - 2.0 * POINT_OFFSET).abs() < 1e-6);
        assert!((height - 4.0 * POINT_OFFSET).abs() < 1e-6);
    }

    #[test]
    fn overlay_keeps_source_grid_under_warped_points() {
        let mut mesh = Mesh::identity(2);
        mesh.set(1, 1, [0.7, 0.6]);
        let overlay = overlay_lines(&mesh, 1.0, Some((1, 1)));

        // 9 boxes of 32 floats on the source grid, 8 warped, 1 selected
        assert_eq!(overlay.source.len(), 9 * 32);
        assert_eq!(overlay.warped.len(), 8 * 32);
        assert_eq!(overlay.selected, pick_box_lines([0.7, 0.6], 1.0).to_vec());

        // the moved vertex still has its box at the grid center
        let center = pick_box_lines(mesh.tex_coord(1, 1), 1.0);
        assert_eq!(mesh.tex_coord(1, 1), [0.5, 0.5]);
        assert!(overlay.source.chunks(32).any(|b| b == center));
        assert!(!overlay.warped.chunks(32).any(|b| b == center));
    }
}
