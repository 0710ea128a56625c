//! Binary photon dump.
//!
//! Layout, all little-endian: `u64` photon count, then per photon
//! `position: [f32; 3]`, `power: [f32; 3]`, `theta: u8`, `phi: u8`,
//! `plane: u8`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::Photon;
use crate::util::{Error, Result, Vec3};

/// Bytes per photon record.
pub const PHOTON_RECORD_SIZE: usize = 27;

pub fn write_photons<'a, W: Write>(w: &mut W, count: usize, photons: impl Iterator<Item = &'a Photon>) -> Result<()> {
    w.write_u64::<LittleEndian>(count as u64)?;
    let mut written = 0usize;
    for p in photons {
        for v in [p.position, p.power] {
            w.write_f32::<LittleEndian>(v.x)?;
            w.write_f32::<LittleEndian>(v.y)?;
            w.write_f32::<LittleEndian>(v.z)?;
        }
        w.write_u8(p.theta)?;
        w.write_u8(p.phi)?;
        w.write_u8(p.plane)?;
        written += 1;
    }
    if written != count {
        return Err(Error::other(format!("photon count mismatch: header {count}, wrote {written}")));
    }
    Ok(())
}

pub fn read_photons<R: Read>(r: &mut R) -> Result<Vec<Photon>> {
    let count = r
        .read_u64::<LittleEndian>()
        .map_err(|e| Error::InvalidPhotonDump(format!("missing header: {e}")))?;
    let count = usize::try_from(count).map_err(|_| Error::InvalidPhotonDump(format!("count {count} too large")))?;

    let mut photons = Vec::new();
    photons
        .try_reserve(count.min(1 << 24))
        .map_err(|e| Error::InvalidPhotonDump(e.to_string()))?;
    for i in 0..count {
        let p = read_photon(r).map_err(|e| Error::InvalidPhotonDump(format!("photon {i} of {count}: {e}")))?;
        photons.push(p);
    }
    Ok(photons)
}

fn read_vec3<R: Read>(r: &mut R) -> std::io::Result<Vec3> {
    Ok(Vec3::new(
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
    ))
}

fn read_photon<R: Read>(r: &mut R) -> std::io::Result<Photon> {
    let position = read_vec3(r)?;
    let power = read_vec3(r)?;
    Ok(Photon { position, power, theta: r.read_u8()?, phi: r.read_u8()?, plane: r.read_u8()? })
}

/// Write photons to `path`.
pub fn save_photons<'a>(path: impl AsRef<Path>, count: usize, photons: impl Iterator<Item = &'a Photon>) -> Result<()> {
    let mut w = BufWriter::new(File::create(path.as_ref())?);
    write_photons(&mut w, count, photons)?;
    w.flush()?;
    Ok(())
}

/// Read a dump written by [`save_photons`].
pub fn load_photons(path: impl AsRef<Path>) -> Result<Vec<Photon>> {
    let mut r = BufReader::new(File::open(path.as_ref())?);
    read_photons(&mut r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Color;

    #[test]
    fn test_record_layout() {
        let p = Photon { position: Vec3::new(1.0, 2.0, 3.0), power: Color::splat(0.5), theta: 7, phi: 200, plane: 2 };
        let mut buf = Vec::new();
        write_photons(&mut buf, 1, std::iter::once(&p)).unwrap();
        assert_eq!(buf.len(), 8 + PHOTON_RECORD_SIZE);
        assert_eq!(&buf[..8], &1u64.to_le_bytes());
        assert_eq!(&buf[8..12], &1.0f32.to_le_bytes());
        assert_eq!(&buf[32..], &[7, 200, 2]);
        assert_eq!(read_photons(&mut buf.as_slice()).unwrap(), vec![p]);
    }

    #[test]
    fn test_truncated_dump_rejected() {
        let p = Photon::default();
        let mut buf = Vec::new();
        write_photons(&mut buf, 1, std::iter::once(&p)).unwrap();
        buf.truncate(buf.len() - 1);
        assert!(matches!(read_photons(&mut buf.as_slice()), Err(Error::InvalidPhotonDump(_))));
        assert!(matches!(read_photons(&mut &[1u8, 2][..]), Err(Error::InvalidPhotonDump(_))));
    }
}
