use crate::mapreduce::KeyValue;

/// Map de WordCount: separa por cualquier carácter que no sea letra ni número,
/// pasa a minúscula y emite (palabra, "1") por cada aparición.
pub fn map_func(input: &str) -> Vec<KeyValue> {
    input
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| KeyValue::new(w.to_lowercase(), "1"))
        .collect()
}

/// Reduce de WordCount: cuenta cuántos pares trae cada clave.
/// Recibe los pares ordenados por clave y devuelve uno por clave.
pub fn reduce_func(input: &[KeyValue]) -> Vec<KeyValue> {
    let mut out: Vec<KeyValue> = Vec::new();
    let mut current: Option<(&str, u64)> = None;

    for kv in input {
        match current {
            Some((key, count)) if key == kv.key => current = Some((key, count + 1)),
            Some((key, count)) => {
                out.push(KeyValue::new(key, count.to_string()));
                current = Some((kv.key.as_str(), 1));
            }
            None => current = Some((kv.key.as_str(), 1)),
        }
    }
    if let Some((key, count)) = current {
        out.push(KeyValue::new(key, count.to_string()));
    }

    out
}
