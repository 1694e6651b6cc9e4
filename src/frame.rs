//! Projection of decoded register values into line frames.
//!
//! The host application consumes a generic line-based byte stream; each
//! successful poll becomes exactly one comma-separated line.

/// Decoded values of one read, in ascending address order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterValues {
    /// Coils or discrete inputs.
    Bits(Vec<bool>),
    /// Holding or input registers.
    Words(Vec<u16>),
}

impl RegisterValues {
    pub fn len(&self) -> usize {
        match self {
            RegisterValues::Bits(bits) => bits.len(),
            RegisterValues::Words(words) => words.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Renders one poll result as a single CSV line with a trailing newline.
///
/// Bits render as `0`/`1`, words as unsigned decimal. No escaping, no header.
pub fn format_frame(values: &RegisterValues) -> Vec<u8> {
    let mut line = String::new();
    match values {
        RegisterValues::Bits(bits) => {
            for (i, bit) in bits.iter().enumerate() {
                if i > 0 {
                    line.push(',');
                }
                line.push(if *bit { '1' } else { '0' });
            }
        }
        RegisterValues::Words(words) => {
            for (i, word) in words.iter().enumerate() {
                if i > 0 {
                    line.push(',');
                }
                line.push_str(&word.to_string());
            }
        }
    }
    line.push('\n');
    line.into_bytes()
}
