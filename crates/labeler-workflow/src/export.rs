//! 标签导出
//!
//! 按扫描顺序输出 `PatientName,DicomName,Label`，行尾为 CRLF。

use crate::store::DataStore;
use labeler_core::Result;
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const HEADER: &str = "PatientName,DicomName,Label";

/// 写出全部检查的标签，返回数据行数
pub fn export_labels<W: Write>(store: &DataStore, mut writer: W) -> Result<usize> {
    write!(writer, "{}\r\n", HEADER)?;

    let mut rows = 0;
    for study in store.patients().iter().flat_map(|p| p.studies.iter()) {
        write!(
            writer,
            "{},{},{}\r\n",
            escape_field(&study.patient_id),
            escape_field(&study.study_id),
            study.label
        )?;
        rows += 1;
    }

    writer.flush()?;
    Ok(rows)
}

/// 导出到文件
pub fn export_labels_to_path(store: &DataStore, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let rows = export_labels(store, BufWriter::new(file))?;
    tracing::info!("Exported {} labels to {}", rows, path.display());
    Ok(rows)
}

fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\r', '\n']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}
