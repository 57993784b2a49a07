use crate::{
    error::{CorpusErr, Result},
    partition::Keyed,
};

/// A sparse vector of term frequencies over a fixed vocabulary.
///
/// Invariants, checked on construction:
/// - `indices` and `values` have the same length.
/// - `indices` are strictly increasing and smaller than `size`.
/// - every value is finite and non-negative.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector {
    size: usize,
    indices: Box<[u32]>,
    values: Box<[f64]>,
}

impl SparseVector {
    /// Creates a new `SparseVector`.
    ///
    /// # Arguments
    /// * `size` - The length of the dense vector this one represents.
    /// * `indices` - The positions of the non-zero entries.
    /// * `values` - The values at those positions.
    ///
    /// # Returns
    /// A `CorpusErr` if any of the invariants doesn't hold.
    pub fn new(size: usize, indices: Vec<u32>, values: Vec<f64>) -> Result<Self> {
        if indices.len() != values.len() {
            return Err(CorpusErr::LengthMismatch {
                indices: indices.len(),
                values: values.len(),
            });
        }

        for (position, pair) in indices.windows(2).enumerate() {
            if pair[0] >= pair[1] {
                return Err(CorpusErr::UnsortedIndices {
                    position: position + 1,
                });
            }
        }

        if let Some(&index) = indices.last().filter(|&&i| i as usize >= size) {
            return Err(CorpusErr::IndexOutOfRange { index, size });
        }

        if let Some((&index, &value)) = indices
            .iter()
            .zip(&values)
            .find(|(_, v)| !v.is_finite() || **v < 0.)
        {
            return Err(CorpusErr::InvalidValue { index, value });
        }

        Ok(Self {
            size,
            indices: indices.into_boxed_slice(),
            values: values.into_boxed_slice(),
        })
    }

    /// Builds a vector from unordered `(index, value)` pairs, summing repeated indices.
    pub fn from_pairs<I>(size: usize, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u32, f64)>,
    {
        let mut pairs: Vec<_> = pairs.into_iter().collect();
        pairs.sort_by_key(|&(index, _)| index);

        let mut indices: Vec<u32> = Vec::with_capacity(pairs.len());
        let mut values: Vec<f64> = Vec::with_capacity(pairs.len());

        for (index, value) in pairs {
            match indices.last() {
                Some(&last) if last == index => {
                    if let Some(acc) = values.last_mut() {
                        *acc += value;
                    }
                }
                _ => {
                    indices.push(index);
                    values.push(value);
                }
            }
        }

        Self::new(size, indices, values)
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The amount of non-zero entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// The sum of all the entries, for a bag of words this is the document length.
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Iterates the non-zero entries as `(index, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices
            .iter()
            .zip(self.values.iter())
            .map(|(&i, &v)| (i as usize, v))
    }
}

/// A bag-of-words document identified by a globally unique id.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: u64,
    pub counts: SparseVector,
}

impl Document {
    pub fn new(id: u64, counts: SparseVector) -> Self {
        Self { id, counts }
    }

    /// The total amount of tokens in the document.
    pub fn words(&self) -> f64 {
        self.counts.total()
    }
}

impl Keyed for Document {
    fn key(&self) -> u64 {
        self.id
    }
}
