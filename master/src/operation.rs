/// Una unidad de trabajo despachada a un worker.
/// Se crea al consumir una entrada y no cambia más: los reintentos reenvían
/// la misma operación, con el mismo id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Procedimiento remoto a invocar ("map" o "reduce")
    pub proc: String,
    /// Denso dentro de una fase: 0..N-1 en orden de consumo
    pub id: usize,
    pub input_path: String,
}

impl Operation {
    pub fn new(proc: impl Into<String>, id: usize, input_path: impl Into<String>) -> Self {
        Self {
            proc: proc.into(),
            id,
            input_path: input_path.into(),
        }
    }
}
