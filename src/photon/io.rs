use crate::color::Rgb;
use crate::error::RenderError;
use crate::photon::{map::PhotonMap, Photon};
use crate::{Point3f, Vec3f};
use std::io::{self, Read, Write};
use tracing::info;

/// On-disk photon map format: version, photon count, then per photon
/// `(position, direction, power, normal)` as little-endian f32 triples,
/// followed by the flat split-axis array of the balanced tree. Bumping the
/// layout means bumping `FORMAT_VERSION`; older files are refused.
pub const FORMAT_VERSION: u32 = 1;

pub fn save(map: &PhotonMap, mut w: impl Write) -> io::Result<()> {
    w.write_all(&FORMAT_VERSION.to_le_bytes())?;
    w.write_all(&(map.len() as u32).to_le_bytes())?;
    w.write_all(&(map.n_paths() as u64).to_le_bytes())?;

    for photon in map.photons() {
        write_vec3(&mut w, [photon.pos.x, photon.pos.y, photon.pos.z])?;
        write_vec3(&mut w, [photon.dir.x, photon.dir.y, photon.dir.z])?;
        write_vec3(&mut w, [photon.power.r, photon.power.g, photon.power.b])?;
        write_vec3(&mut w, [photon.normal.x, photon.normal.y, photon.normal.z])?;
    }

    w.write_all(map.split_axes())?;
    Ok(())
}

pub fn load(mut r: impl Read) -> Result<PhotonMap, RenderError> {
    let version = read_u32(&mut r)?;
    if version != FORMAT_VERSION {
        return Err(RenderError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "photon map version {} unsupported (expected {})",
                version, FORMAT_VERSION
            ),
        )));
    }

    let count = read_u32(&mut r)? as usize;
    let n_paths = read_u64(&mut r)? as usize;

    let mut photons = Vec::with_capacity(count);
    for _ in 0..count {
        let pos = read_vec3(&mut r)?;
        let dir = read_vec3(&mut r)?;
        let power = read_vec3(&mut r)?;
        let normal = read_vec3(&mut r)?;
        photons.push(Photon {
            pos: Point3f::new(pos[0], pos[1], pos[2]),
            dir: Vec3f::new(dir[0], dir[1], dir[2]),
            power: Rgb::new(power[0], power[1], power[2]),
            normal: Vec3f::new(normal[0], normal[1], normal[2]),
        });
    }

    let mut axes = vec![0u8; count];
    r.read_exact(&mut axes)?;

    info!(photons = count, "photon map loaded from disk");
    Ok(PhotonMap::from_parts(photons, axes, n_paths))
}

fn write_vec3(w: &mut impl Write, v: [f32; 3]) -> io::Result<()> {
    for c in &v {
        w.write_all(&c.to_le_bytes())?;
    }
    Ok(())
}

fn read_vec3(r: &mut impl Read) -> io::Result<[f32; 3]> {
    let mut out = [0.0f32; 3];
    let mut buf = [0u8; 4];
    for c in &mut out {
        r.read_exact(&mut buf)?;
        *c = f32::from_le_bytes(buf);
    }
    Ok(out)
}

fn read_u32(r: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(r: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
