use anyhow::{bail, Context, Result};
use fnv::FnvHasher;
use glob::{glob, Pattern};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    hash::Hasher,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::task::Task;

/// Par intermedio producido por map y consumido por reduce.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Función map: contenido de un split -> pares intermedios.
pub type MapFn = fn(&str) -> Vec<KeyValue>;

/// Función reduce: todos los pares de una partición, ordenados por clave.
pub type ReduceFn = fn(&[KeyValue]) -> Vec<KeyValue>;

/// Hash de 32 bits de una clave intermedia: FNV-1a de 64 bits recortado a 31 bits.
pub fn key_hash(key: &[u8]) -> u32 {
    let mut hasher = FnvHasher::default();
    hasher.write(key);
    (hasher.finish() & 0x7fff_ffff) as u32
}

/// Decide a qué reduce job va una clave.
/// Sólo depende de la clave y de `task.num_reduce_jobs`, así todos los valores
/// de una clave terminan en la misma partición en cualquier proceso.
pub fn shuffle(task: &Task, key: &str) -> usize {
    let n = task.num_reduce_jobs.max(1) as u64;
    (u64::from(key_hash(key.as_bytes())) % n) as usize
}

/* =========================
   Nombres de archivos del job
   ========================= */

pub fn split_file_path(work_dir: &str, split_id: usize) -> PathBuf {
    Path::new(work_dir).join(format!("split-{}.txt", split_id))
}

pub fn map_file_path(work_dir: &str, map_id: usize, reduce_id: usize) -> PathBuf {
    Path::new(work_dir).join(format!("map-{}-{}.jsonl", map_id, reduce_id))
}

pub fn reduce_file_path(work_dir: &str, reduce_id: usize) -> PathBuf {
    Path::new(work_dir).join(format!("reduce-{}.jsonl", reduce_id))
}

pub fn result_file_path(work_dir: &str) -> PathBuf {
    Path::new(work_dir).join("result.txt")
}

/* =========================
   E/S de pares intermedios
   ========================= */

/// Escribe en un temporal propio del directorio destino y lo renombra, para que
/// un intento fallido nunca deje un archivo a medias con el nombre definitivo.
/// Dos escritores del mismo archivo no comparten temporal: gana el último rename.
fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("no se pudo crear un temporal en {}", dir.display()))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    tmp.persist(path)
        .with_context(|| format!("no se pudo renombrar el temporal a {}", path.display()))?;
    Ok(())
}

/// Un par por línea, en JSON.
pub fn write_key_values(path: &Path, kvs: &[KeyValue]) -> Result<()> {
    write_atomically(path, |w| {
        for kv in kvs {
            serde_json::to_writer(&mut *w, kv)?;
            w.write_all(b"\n")?;
        }
        Ok(())
    })
}

pub fn read_key_values(path: &Path) -> Result<Vec<KeyValue>> {
    let file =
        File::open(path).with_context(|| format!("no se pudo abrir {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let kv: KeyValue = serde_json::from_str(&line)
            .with_context(|| format!("línea inválida en {}", path.display()))?;
        out.push(kv);
    }
    Ok(out)
}

/* =========================
   Split de entrada
   ========================= */

/// Parte `input_path` en archivos `split-<n>.txt` de ~`chunk_size` bytes,
/// cortando siempre en fin de línea. Llama a `on_split` con la ruta de cada
/// split apenas queda escrito, así el consumidor puede empezar antes de que
/// termine el split completo. Devuelve cuántos splits se generaron.
pub fn split_input<F>(input_path: &str, work_dir: &str, chunk_size: usize, mut on_split: F) -> Result<usize>
where
    F: FnMut(String) -> Result<()>,
{
    let file = File::open(input_path)
        .with_context(|| format!("no se pudo abrir la entrada {}", input_path))?;
    let reader = BufReader::new(file);
    fs::create_dir_all(work_dir)?;

    let chunk_size = chunk_size.max(1);
    let mut buf = String::new();
    let mut count = 0;

    let mut flush = |buf: &mut String, count: &mut usize| -> Result<()> {
        let path = split_file_path(work_dir, *count);
        let contents = std::mem::take(buf);
        write_atomically(&path, |w| w.write_all(contents.as_bytes()))?;
        *count += 1;
        on_split(path.to_string_lossy().to_string())
    };

    for line in reader.lines() {
        let line = line?;
        buf.push_str(&line);
        buf.push('\n');
        if buf.len() >= chunk_size {
            flush(&mut buf, &mut count)?;
        }
    }
    if !buf.is_empty() {
        flush(&mut buf, &mut count)?;
    }

    Ok(count)
}

/* =========================
   Map / reduce sobre archivos
   ========================= */

/// Ejecuta map sobre un split y reparte los pares en un archivo por reduce job.
/// Siempre crea los `num_reduce_jobs` archivos, aunque queden vacíos.
pub fn run_map(task: &Task, map_id: usize, input_path: &str, map_fn: MapFn) -> Result<usize> {
    let content = fs::read_to_string(input_path)
        .with_context(|| format!("no se pudo leer el split {}", input_path))?;

    let num_partitions = task.num_reduce_jobs.max(1);
    let mut buckets: Vec<Vec<KeyValue>> = vec![Vec::new(); num_partitions];

    let kvs = map_fn(&content);
    let total = kvs.len();
    for kv in kvs {
        let r = shuffle(task, &kv.key);
        buckets[r].push(kv);
    }

    for (reduce_id, bucket) in buckets.iter().enumerate() {
        write_key_values(&map_file_path(&task.work_dir, map_id, reduce_id), bucket)?;
    }

    debug!(
        "map {} del job {}: {} pares en {} particiones",
        map_id, task.job_id, total, num_partitions
    );
    Ok(total)
}

/// Ejecuta reduce sobre todas las salidas de map de la partición `reduce_id`.
pub fn run_reduce(task: &Task, reduce_id: usize, reduce_fn: ReduceFn) -> Result<usize> {
    if reduce_id >= task.num_reduce_jobs.max(1) {
        bail!(
            "reduce job {} fuera de rango (num_reduce_jobs={})",
            reduce_id,
            task.num_reduce_jobs
        );
    }

    let pattern = format!(
        "{}/map-*-{}.jsonl",
        Pattern::escape(&task.work_dir),
        reduce_id
    );

    let mut input = Vec::new();
    let mut files = 0;
    for entry in glob(&pattern)? {
        let path = entry?;
        input.extend(read_key_values(&path)?);
        files += 1;
    }

    input.sort_by(|a, b| a.key.cmp(&b.key));
    let output = reduce_fn(&input);
    write_key_values(&reduce_file_path(&task.work_dir, reduce_id), &output)?;

    debug!(
        "reduce {} del job {}: {} pares de {} archivos -> {} resultados",
        reduce_id,
        task.job_id,
        input.len(),
        files,
        output.len()
    );
    Ok(output.len())
}

/// Junta las salidas `reduce-<r>.jsonl` en `result.txt` ("clave,valor" por línea,
/// ordenado por clave). Devuelve cuántas líneas escribió.
pub fn merge_reduce_outputs(work_dir: &str, num_reduce_jobs: usize) -> Result<usize> {
    let mut all = Vec::new();
    for reduce_id in 0..num_reduce_jobs {
        all.extend(read_key_values(&reduce_file_path(work_dir, reduce_id))?);
    }
    all.sort();

    let lines = all.len();
    write_atomically(&result_file_path(work_dir), |w| {
        for kv in &all {
            writeln!(w, "{},{}", kv.key, kv.value)?;
        }
        Ok(())
    })?;
    Ok(lines)
}
