use md5::Md5;
use sha1::digest::Output;
use sha1::{Digest, Sha1};
use std::fmt::LowerHex;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

const READ_CHUNK_SIZE: usize = 16384;

pub fn calculate_sha1(path: &Path) -> io::Result<String> {
    digest_file::<Sha1>(path)
}

pub fn calculate_md5(path: &Path) -> io::Result<String> {
    digest_file::<Md5>(path)
}

/// SHA-1 of a file, hashed on the blocking pool.
pub async fn sha1_file(path: &Path) -> io::Result<String> {
    let path = path.to_path_buf();
    spawn_digest(path, calculate_sha1).await
}

/// MD5 of a file, hashed on the blocking pool.
pub async fn md5_file(path: &Path) -> io::Result<String> {
    let path = path.to_path_buf();
    spawn_digest(path, calculate_md5).await
}

async fn spawn_digest(
    path: PathBuf,
    digest: fn(&Path) -> io::Result<String>,
) -> io::Result<String> {
    tokio::task::spawn_blocking(move || digest(&path))
        .await
        .map_err(io::Error::other)?
}

fn digest_file<D: Digest>(path: &Path) -> io::Result<String>
where
    Output<D>: LowerHex,
{
    let mut file = File::open(path)?;
    let mut hasher = D::new();
    let mut buffer = [0; READ_CHUNK_SIZE];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Copy `reader` into `writer`, returning the digest of everything copied and the byte count.
pub fn copy_and_digest<D: Digest, R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
) -> io::Result<(String, u64)>
where
    Output<D>: LowerHex,
{
    let mut hasher = D::new();
    let mut buffer = [0; READ_CHUNK_SIZE];
    let mut written = 0u64;

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        writer.write_all(&buffer[..n])?;
        written += n as u64;
    }

    writer.flush()?;
    Ok((format!("{:x}", hasher.finalize()), written))
}

/// Hex digests compare case-insensitively and ignore surrounding whitespace.
pub fn hashes_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}
