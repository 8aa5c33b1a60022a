//! PLY (Polygon File Format) I/O
//!
//! COLMAP writes binary little-endian PLY for fused clouds and Poisson
//! meshes, model_converter output and hand-made test files are often ascii.
//! Both are read here; everything we write is binary little-endian.
//!
//! Only the parts the pipeline needs are interpreted: vertex positions,
//! normals and colors, and triangle (or fan-triangulated polygon) faces.
//! Other properties and elements are read past and dropped.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use nalgebra::{Point3, Vector3};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use super::{PointCloud, TriangleMesh};
use crate::error::{ReconError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Ascii,
    BinaryLittleEndian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ScalarType {
    fn parse(name: &str) -> Result<Self> {
        Ok(match name {
            "char" | "int8" => Self::I8,
            "uchar" | "uint8" => Self::U8,
            "short" | "int16" => Self::I16,
            "ushort" | "uint16" => Self::U16,
            "int" | "int32" => Self::I32,
            "uint" | "uint32" => Self::U32,
            "float" | "float32" => Self::F32,
            "double" | "float64" => Self::F64,
            other => return Err(ply_error(format!("unknown property type '{}'", other))),
        })
    }
}

#[derive(Debug, Clone)]
enum Property {
    Scalar {
        name: String,
        ty: ScalarType,
    },
    List {
        name: String,
        count: ScalarType,
        item: ScalarType,
    },
}

impl Property {
    fn name(&self) -> &str {
        match self {
            Property::Scalar { name, .. } | Property::List { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone)]
struct Element {
    name: String,
    count: usize,
    properties: Vec<Property>,
}

#[derive(Debug)]
struct Header {
    encoding: Encoding,
    elements: Vec<Element>,
}

fn ply_error(message: impl Into<String>) -> ReconError {
    ReconError::Ply(message.into())
}

fn read_header<R: BufRead>(reader: &mut R) -> Result<Header> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim() != "ply" {
        return Err(ply_error("missing 'ply' magic"));
    }

    let mut encoding = None;
    let mut elements: Vec<Element> = Vec::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(ply_error("unexpected end of file in header"));
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [] | ["comment", ..] | ["obj_info", ..] => {}
            ["format", "ascii", _] => encoding = Some(Encoding::Ascii),
            ["format", "binary_little_endian", _] => {
                encoding = Some(Encoding::BinaryLittleEndian)
            }
            ["format", other, ..] => {
                return Err(ply_error(format!("unsupported format '{}'", other)))
            }
            ["element", name, count] => {
                let count = count
                    .parse()
                    .map_err(|_| ply_error(format!("invalid element count '{}'", count)))?;
                elements.push(Element {
                    name: name.to_string(),
                    count,
                    properties: Vec::new(),
                });
            }
            ["property", "list", count, item, name] => {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| ply_error("property before any element"))?;
                element.properties.push(Property::List {
                    name: name.to_string(),
                    count: ScalarType::parse(count)?,
                    item: ScalarType::parse(item)?,
                });
            }
            ["property", ty, name] => {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| ply_error("property before any element"))?;
                element.properties.push(Property::Scalar {
                    name: name.to_string(),
                    ty: ScalarType::parse(ty)?,
                });
            }
            ["end_header"] => break,
            _ => return Err(ply_error(format!("unrecognized header line '{}'", line.trim()))),
        }
    }

    let encoding = encoding.ok_or_else(|| ply_error("missing format line"))?;
    Ok(Header { encoding, elements })
}

/// Sequential source of property values, regardless of encoding
trait ValueSource {
    fn next_value(&mut self, ty: ScalarType) -> Result<f64>;
}

struct AsciiValues<'a> {
    tokens: std::str::SplitAsciiWhitespace<'a>,
}

impl ValueSource for AsciiValues<'_> {
    fn next_value(&mut self, _ty: ScalarType) -> Result<f64> {
        let token = self
            .tokens
            .next()
            .ok_or_else(|| ply_error("unexpected end of data"))?;
        token
            .parse()
            .map_err(|_| ply_error(format!("invalid number '{}'", token)))
    }
}

struct BinaryValues<R> {
    reader: R,
}

impl<R: Read> ValueSource for BinaryValues<R> {
    fn next_value(&mut self, ty: ScalarType) -> Result<f64> {
        let r = &mut self.reader;
        let value = match ty {
            ScalarType::I8 => r.read_i8().map(f64::from),
            ScalarType::U8 => r.read_u8().map(f64::from),
            ScalarType::I16 => r.read_i16::<LittleEndian>().map(f64::from),
            ScalarType::U16 => r.read_u16::<LittleEndian>().map(f64::from),
            ScalarType::I32 => r.read_i32::<LittleEndian>().map(f64::from),
            ScalarType::U32 => r.read_u32::<LittleEndian>().map(f64::from),
            ScalarType::F32 => r.read_f32::<LittleEndian>().map(f64::from),
            ScalarType::F64 => r.read_f64::<LittleEndian>(),
        };

        value.map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => ply_error("truncated binary data"),
            _ => ReconError::Io(e),
        })
    }
}

/// Where the interesting vertex properties sit in a decoded row
struct VertexLayout {
    position: [usize; 3],
    normal: Option<[usize; 3]>,
    color: Option<[usize; 3]>,
}

impl VertexLayout {
    fn for_element(element: &Element) -> Result<Self> {
        let find = |name: &str| element.properties.iter().position(|p| p.name() == name);
        let find3 = |a: &str, b: &str, c: &str| Some([find(a)?, find(b)?, find(c)?]);

        let position = find3("x", "y", "z")
            .ok_or_else(|| ply_error("vertex element lacks x/y/z"))?;
        let color = find3("red", "green", "blue")
            .or_else(|| find3("diffuse_red", "diffuse_green", "diffuse_blue"));

        Ok(Self {
            position,
            normal: find3("nx", "ny", "nz"),
            color,
        })
    }
}

/// Read one element instance into `row`; list properties are consumed and left at 0
fn read_row<S: ValueSource>(element: &Element, src: &mut S, row: &mut [f64]) -> Result<()> {
    for (slot, property) in row.iter_mut().zip(&element.properties) {
        *slot = match property {
            Property::Scalar { ty, .. } => src.next_value(*ty)?,
            Property::List { count, item, .. } => {
                let n = src.next_value(*count)? as usize;
                for _ in 0..n {
                    src.next_value(*item)?;
                }
                0.0
            }
        };
    }
    Ok(())
}

fn decode_body<S: ValueSource>(header: &Header, src: &mut S) -> Result<TriangleMesh> {
    let mut mesh = TriangleMesh::default();

    for element in &header.elements {
        match element.name.as_str() {
            "vertex" => read_vertices(element, src, &mut mesh)?,
            "face" => read_faces(element, src, &mut mesh)?,
            _ => {
                let mut row = vec![0.0; element.properties.len()];
                for _ in 0..element.count {
                    read_row(element, src, &mut row)?;
                }
            }
        }
    }

    let vertex_count = mesh.vertices.len() as u32;
    if mesh.faces.iter().flatten().any(|&i| i >= vertex_count) {
        return Err(ply_error("face references a vertex out of range"));
    }

    Ok(mesh)
}

/// Upper bound on rows reserved up front; header counts are not trusted
const PREALLOC_LIMIT: usize = 1 << 20;

fn read_vertices<S: ValueSource>(
    element: &Element,
    src: &mut S,
    mesh: &mut TriangleMesh,
) -> Result<()> {
    let layout = VertexLayout::for_element(element)?;
    let mut row = vec![0.0; element.properties.len()];

    let capacity = element.count.min(PREALLOC_LIMIT);
    let mut vertices = Vec::with_capacity(capacity);
    let mut normals = layout.normal.map(|_| Vec::with_capacity(capacity));
    let mut colors = layout.color.map(|_| Vec::with_capacity(capacity));

    for _ in 0..element.count {
        read_row(element, src, &mut row)?;

        let [x, y, z] = layout.position;
        vertices.push(Point3::new(row[x] as f32, row[y] as f32, row[z] as f32));

        if let (Some([nx, ny, nz]), Some(normals)) = (layout.normal, normals.as_mut()) {
            normals.push(Vector3::new(row[nx] as f32, row[ny] as f32, row[nz] as f32));
        }
        if let (Some([r, g, b]), Some(colors)) = (layout.color, colors.as_mut()) {
            colors.push([
                row[r].clamp(0.0, 255.0) as u8,
                row[g].clamp(0.0, 255.0) as u8,
                row[b].clamp(0.0, 255.0) as u8,
            ]);
        }
    }

    mesh.vertices = vertices;
    mesh.normals = normals;
    mesh.colors = colors;
    Ok(())
}

fn read_faces<S: ValueSource>(element: &Element, src: &mut S, mesh: &mut TriangleMesh) -> Result<()> {
    let index_list = element
        .properties
        .iter()
        .position(|p| {
            matches!(p, Property::List { name, .. } if name == "vertex_indices" || name == "vertex_index")
        })
        .ok_or_else(|| ply_error("face element lacks a vertex index list"))?;

    let mut polygon: Vec<u32> = Vec::new();
    mesh.faces.reserve(element.count.min(PREALLOC_LIMIT));

    for _ in 0..element.count {
        for (i, property) in element.properties.iter().enumerate() {
            match property {
                Property::Scalar { ty, .. } => {
                    src.next_value(*ty)?;
                }
                Property::List { count, item, .. } => {
                    let n = src.next_value(*count)? as usize;
                    if i == index_list {
                        polygon.clear();
                        for _ in 0..n {
                            let index = src.next_value(*item)?;
                            if index < 0.0 {
                                return Err(ply_error("negative vertex index"));
                            }
                            polygon.push(index as u32);
                        }
                    } else {
                        for _ in 0..n {
                            src.next_value(*item)?;
                        }
                    }
                }
            }
        }

        // Fan triangulation; COLMAP only emits triangles
        for k in 1..polygon.len().saturating_sub(1) {
            mesh.faces.push([polygon[0], polygon[k], polygon[k + 1]]);
        }
    }

    Ok(())
}

fn read_from<R: BufRead>(mut reader: R) -> Result<TriangleMesh> {
    let header = read_header(&mut reader)?;

    match header.encoding {
        Encoding::Ascii => {
            let mut body = String::new();
            reader.read_to_string(&mut body)?;
            let mut src = AsciiValues {
                tokens: body.split_ascii_whitespace(),
            };
            decode_body(&header, &mut src)
        }
        Encoding::BinaryLittleEndian => decode_body(&header, &mut BinaryValues { reader }),
    }
}

/// Read a PLY file as a mesh; a pure point cloud yields no faces
pub fn read_mesh(path: &Path) -> Result<TriangleMesh> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ReconError::MissingInput(path.to_path_buf()),
        _ => ReconError::Io(e),
    })?;
    read_from(BufReader::new(file))
}

/// Read the vertices of a PLY file, ignoring any faces
pub fn read_point_cloud(path: &Path) -> Result<PointCloud> {
    let mesh = read_mesh(path)?;
    Ok(PointCloud {
        points: mesh.vertices,
        normals: mesh.normals,
        colors: mesh.colors,
    })
}

fn write_ply<W: Write>(
    writer: &mut W,
    points: &[Point3<f32>],
    normals: Option<&[Vector3<f32>]>,
    colors: Option<&[[u8; 3]]>,
    faces: Option<&[[u32; 3]]>,
) -> Result<()> {
    if normals.is_some_and(|n| n.len() != points.len()) {
        return Err(ply_error("normal count does not match vertex count"));
    }
    if colors.is_some_and(|c| c.len() != points.len()) {
        return Err(ply_error("color count does not match vertex count"));
    }

    writeln!(writer, "ply")?;
    writeln!(writer, "format binary_little_endian 1.0")?;
    writeln!(writer, "comment written by recon-studio")?;
    writeln!(writer, "element vertex {}", points.len())?;
    writeln!(writer, "property float x")?;
    writeln!(writer, "property float y")?;
    writeln!(writer, "property float z")?;
    if normals.is_some() {
        writeln!(writer, "property float nx")?;
        writeln!(writer, "property float ny")?;
        writeln!(writer, "property float nz")?;
    }
    if colors.is_some() {
        writeln!(writer, "property uchar red")?;
        writeln!(writer, "property uchar green")?;
        writeln!(writer, "property uchar blue")?;
    }
    if let Some(faces) = faces {
        writeln!(writer, "element face {}", faces.len())?;
        writeln!(writer, "property list uchar int vertex_indices")?;
    }
    writeln!(writer, "end_header")?;

    for (i, p) in points.iter().enumerate() {
        writer.write_f32::<LittleEndian>(p.x)?;
        writer.write_f32::<LittleEndian>(p.y)?;
        writer.write_f32::<LittleEndian>(p.z)?;
        if let Some(normals) = normals {
            let n = normals[i];
            writer.write_f32::<LittleEndian>(n.x)?;
            writer.write_f32::<LittleEndian>(n.y)?;
            writer.write_f32::<LittleEndian>(n.z)?;
        }
        if let Some(colors) = colors {
            writer.write_all(&colors[i])?;
        }
    }

    for face in faces.unwrap_or_default() {
        writer.write_u8(3)?;
        for &index in face {
            writer.write_i32::<LittleEndian>(index as i32)?;
        }
    }

    writer.flush()?;
    Ok(())
}

pub fn write_point_cloud(path: &Path, cloud: &PointCloud) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_ply(
        &mut writer,
        &cloud.points,
        cloud.normals.as_deref(),
        cloud.colors.as_deref(),
        None,
    )
}

pub fn write_mesh(path: &Path, mesh: &TriangleMesh) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_ply(
        &mut writer,
        &mesh.vertices,
        mesh.normals.as_deref(),
        mesh.colors.as_deref(),
        Some(&mesh.faces),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const ASCII_QUAD: &str = "ply
format ascii 1.0
comment hand written
element vertex 4
property double x
property double y
property double z
property float nx
property float ny
property float nz
property uchar red
property uchar green
property uchar blue
property float confidence
element face 1
property list uchar int vertex_indices
end_header
0 0 0 0 0 1 255 0 0 0.5
1 0 0 0 0 1 0 255 0 0.5
1 1 0 0 0 1 0 0 255 0.5
0 1 0 0 0 1 10 20 30 0.5
4 0 1 2 3
";

    #[test]
    fn test_read_ascii_with_extra_property_and_quad() {
        let mesh = read_from(Cursor::new(ASCII_QUAD)).unwrap();

        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.vertices[2], Point3::new(1.0, 1.0, 0.0));
        assert_eq!(mesh.normals.as_ref().unwrap()[3], Vector3::z());
        assert_eq!(mesh.colors.as_ref().unwrap()[3], [10, 20, 30]);
        assert_eq!(mesh.faces, vec![[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn test_binary_mesh_written_then_read() {
        let mesh = TriangleMesh {
            vertices: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.5),
            ],
            normals: Some(vec![Vector3::z(); 3]),
            colors: None,
            faces: vec![[0, 1, 2]],
        };

        let mut bytes = Vec::new();
        write_ply(
            &mut bytes,
            &mesh.vertices,
            mesh.normals.as_deref(),
            None,
            Some(&mesh.faces),
        )
        .unwrap();

        assert_eq!(read_from(Cursor::new(bytes)).unwrap(), mesh);
    }

    #[test]
    fn test_colmap_style_binary_cloud() {
        // x y z nx ny nz red green blue, as written by stereo_fusion
        let mut bytes = b"ply\nformat binary_little_endian 1.0\nelement vertex 2\n\
property float x\nproperty float y\nproperty float z\n\
property float nx\nproperty float ny\nproperty float nz\n\
property uchar red\nproperty uchar green\nproperty uchar blue\nend_header\n"
            .to_vec();
        for (p, c) in [([1.0f32, 2.0, 3.0], [1u8, 2, 3]), ([4.0, 5.0, 6.0], [4, 5, 6])] {
            for v in p {
                bytes.write_f32::<LittleEndian>(v).unwrap();
            }
            for v in [0.0f32, 1.0, 0.0] {
                bytes.write_f32::<LittleEndian>(v).unwrap();
            }
            bytes.extend_from_slice(&c);
        }

        let mesh = read_from(Cursor::new(bytes)).unwrap();
        assert_eq!(mesh.vertices[1], Point3::new(4.0, 5.0, 6.0));
        assert_eq!(mesh.normals.unwrap()[0], Vector3::y());
        assert_eq!(mesh.colors.unwrap()[1], [4, 5, 6]);
        assert!(mesh.faces.is_empty());
    }

    #[test]
    fn test_truncated_binary_is_rejected() {
        let bytes = b"ply\nformat binary_little_endian 1.0\nelement vertex 2\n\
property float x\nproperty float y\nproperty float z\nend_header\n\0\0\0\0"
            .to_vec();
        let err = read_from(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, ReconError::Ply(_)));
    }

    #[test]
    fn test_huge_declared_count_without_body_is_an_error() {
        for ascii in [true, false] {
            let format = if ascii { "ascii" } else { "binary_little_endian" };
            let header = format!(
                "ply\nformat {} 1.0\nelement vertex 2000000000000\nproperty float x\nproperty float y\nproperty float z\nend_header\n",
                format
            );
            assert!(matches!(read_from(Cursor::new(header)), Err(ReconError::Ply(_))));
        }

        let faces = "ply\nformat ascii 1.0\nelement vertex 0\nproperty float x\nproperty float y\nproperty float z\nelement face 2000000000000\nproperty list uchar int vertex_indices\nend_header\n";
        assert!(matches!(read_from(Cursor::new(faces)), Err(ReconError::Ply(_))));
    }

    #[test]
    fn test_big_endian_is_rejected() {
        let text = "ply\nformat binary_big_endian 1.0\nelement vertex 0\nend_header\n";
        assert!(matches!(
            read_from(Cursor::new(text)),
            Err(ReconError::Ply(_))
        ));
    }

    #[test]
    fn test_out_of_range_face_is_rejected() {
        let text = "ply\nformat ascii 1.0\nelement vertex 1\nproperty float x\n\
property float y\nproperty float z\nelement face 1\n\
property list uchar int vertex_index\nend_header\n0 0 0\n3 0 1 2\n";
        assert!(matches!(
            read_from(Cursor::new(text)),
            Err(ReconError::Ply(_))
        ));
    }

    #[test]
    fn test_missing_file_is_missing_input() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("dense.ply");
        assert!(matches!(
            read_point_cloud(&path),
            Err(ReconError::MissingInput(p)) if p == path
        ));
    }

    #[test]
    fn test_mismatched_normals_are_rejected_on_write() {
        let tmp = tempfile::tempdir().unwrap();
        let cloud = PointCloud {
            points: vec![Point3::origin(); 2],
            normals: Some(vec![Vector3::z()]),
            colors: None,
        };
        assert!(write_point_cloud(&tmp.path().join("bad.ply"), &cloud).is_err());
    }
}
