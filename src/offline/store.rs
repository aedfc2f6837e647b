use crate::base::DecompositionType;
use crate::SgdeError;
use russell_lab::Matrix;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

/// Holds the header line of a persisted decomposition
///
/// The header reads `rows,cols,tag,ngroups,[size,idx...]*` and is followed by the raw payload.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredHeader {
    /// Number of rows of the payload
    pub nrow: usize,

    /// Number of columns of the payload
    pub ncol: usize,

    /// Decomposition type
    pub kind: DecompositionType,

    /// Interaction groups of the grid
    pub interactions: Vec<Vec<usize>>,
}

/// Holds a persisted decomposition: the factor payload, its type, and the grid interactions
#[derive(Clone, Debug)]
pub struct StoredDecomposition {
    /// Decomposition type
    pub kind: DecompositionType,

    /// Interaction groups of the grid
    pub interactions: Vec<Vec<usize>>,

    /// Factor payload (see [crate::offline::FactorizationTrait::payload])
    pub payload: Matrix,
}

impl StoredHeader {
    /// Returns the text of the header line (without the newline)
    pub fn to_line(&self) -> String {
        let mut tokens = vec![
            self.nrow.to_string(),
            self.ncol.to_string(),
            self.kind.tag().to_string(),
            self.interactions.len().to_string(),
        ];
        for group in &self.interactions {
            tokens.push(group.len().to_string());
            tokens.extend(group.iter().map(|d| d.to_string()));
        }
        tokens.join(",")
    }

    /// Parses the header line
    pub fn parse(line: &str) -> Result<Self, SgdeError> {
        let mut tokens = line.trim_end_matches(['\n', '\r']).split(',');
        let mut next = |what: &str| -> Result<i64, SgdeError> {
            let token = tokens
                .next()
                .ok_or_else(|| SgdeError::Format(format!("header is missing the {}", what)))?;
            token
                .trim()
                .parse::<i64>()
                .map_err(|_| SgdeError::Format(format!("header has an invalid {}: {:?}", what, token)))
        };
        let nrow = non_negative(next("row count")?, "row count")?;
        let ncol = non_negative(next("column count")?, "column count")?;
        let tag = next("decomposition tag")?;
        let kind = DecompositionType::from_tag(tag)
            .ok_or_else(|| SgdeError::Format(format!("header has an unknown decomposition tag {}", tag)))?;
        let ngroups = non_negative(next("group count")?, "group count")?;
        let mut interactions = Vec::new();
        for _ in 0..ngroups {
            let size = non_negative(next("group size")?, "group size")?;
            let mut group = Vec::new();
            for _ in 0..size {
                group.push(non_negative(next("group index")?, "group index")?);
            }
            interactions.push(group);
        }
        if tokens.next().is_some() {
            return Err(SgdeError::Format("header has trailing tokens".to_string()));
        }
        Ok(StoredHeader {
            nrow,
            ncol,
            kind,
            interactions,
        })
    }

    /// Reads only the header of a persisted decomposition
    pub fn read<P>(full_path: &P) -> Result<Self, SgdeError>
    where
        P: AsRef<OsStr> + ?Sized,
    {
        let path = Path::new(full_path);
        let file = File::open(path).map_err(|e| SgdeError::io(path, e))?;
        let mut reader = BufReader::new(file);
        read_header(&mut reader, path)
    }
}

impl StoredDecomposition {
    /// Writes the header line followed by the row-major little-endian payload
    pub fn save<P>(&self, full_path: &P) -> Result<(), SgdeError>
    where
        P: AsRef<OsStr> + ?Sized,
    {
        let path = Path::new(full_path);
        if let Some(p) = path.parent() {
            fs::create_dir_all(p).map_err(|e| SgdeError::io(p, e))?;
        }
        let (nrow, ncol) = self.payload.dims();
        let header = StoredHeader {
            nrow,
            ncol,
            kind: self.kind,
            interactions: self.interactions.clone(),
        };
        let file = File::create(path).map_err(|e| SgdeError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", header.to_line()).map_err(|e| SgdeError::io(path, e))?;
        for i in 0..nrow {
            for j in 0..ncol {
                writer
                    .write_all(&self.payload.get(i, j).to_le_bytes())
                    .map_err(|e| SgdeError::io(path, e))?;
            }
        }
        writer.flush().map_err(|e| SgdeError::io(path, e))?;
        log::debug!("saved {} decomposition ({}×{}) to {}", self.kind, nrow, ncol, path.display());
        Ok(())
    }

    /// Reads a persisted decomposition (the exact inverse of [StoredDecomposition::save])
    pub fn load<P>(full_path: &P) -> Result<Self, SgdeError>
    where
        P: AsRef<OsStr> + ?Sized,
    {
        let path = Path::new(full_path);
        let file = File::open(path).map_err(|e| SgdeError::io(path, e))?;
        let mut reader = BufReader::new(file);
        let header = read_header(&mut reader, path)?;
        let mut payload = Matrix::new(header.nrow, header.ncol);
        let mut bytes = [0u8; 8];
        for i in 0..header.nrow {
            for j in 0..header.ncol {
                reader.read_exact(&mut bytes).map_err(|e| match e.kind() {
                    ErrorKind::UnexpectedEof => SgdeError::Format(format!(
                        "payload is truncated (expected {}×{} values)",
                        header.nrow, header.ncol
                    )),
                    _ => SgdeError::io(path, e),
                })?;
                payload.set(i, j, f64::from_le_bytes(bytes));
            }
        }
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).map_err(|e| SgdeError::io(path, e))?;
        if !rest.is_empty() {
            return Err(SgdeError::Format(format!(
                "payload has {} unexpected trailing bytes",
                rest.len()
            )));
        }
        Ok(StoredDecomposition {
            kind: header.kind,
            interactions: header.interactions,
            payload,
        })
    }
}

/// Reads the header line from the beginning of a file
fn read_header<R: BufRead>(reader: &mut R, path: &Path) -> Result<StoredHeader, SgdeError> {
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line).map_err(|e| SgdeError::io(path, e))?;
    if line.last() != Some(&b'\n') {
        return Err(SgdeError::Format("header line is not terminated".to_string()));
    }
    let text = std::str::from_utf8(&line).map_err(|_| SgdeError::Format("header is not valid text".to_string()))?;
    StoredHeader::parse(text)
}

/// Converts a header integer into a size or index
fn non_negative(value: i64, what: &str) -> Result<usize, SgdeError> {
    usize::try_from(value).map_err(|_| SgdeError::Format(format!("header has a negative {}: {}", what, value)))
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
