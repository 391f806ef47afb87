use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

pub(crate) fn file_to_vec<P: AsRef<Path>>(filename: P) -> io::Result<Vec<String>> {
    let file_in = fs::File::open(filename)?;
    let file_reader = BufReader::new(file_in);
    file_reader
        .lines()
        .map(|line| line.map(|l| l.trim_end_matches('\r').to_string()))
        .collect()
}

/// Writes `data` to `name` inside the diagnostic directory.
pub(crate) fn save_diag(name: &str, data: &[u8]) {
    let saved = crate::data::FsAccess::diag_dir()
        .and_then(|dir| fs::write(dir.join(name), data).map_err(Into::into));
    if let Err(err) = saved {
        log::warn!("Failed to save diagnostic file {}: {}", name, err);
    }
}
