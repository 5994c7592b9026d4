use std::collections::HashMap;

/// Named face/morph weights driven by morph tracks
#[derive(Debug, Clone, Default)]
pub struct MorphWeights {
    names: Vec<String>,
    lookup: HashMap<String, usize>,
    weights: Vec<f32>,
}

impl MorphWeights {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut lookup = HashMap::with_capacity(names.len());
        for (index, name) in names.iter().enumerate() {
            lookup.entry(name.clone()).or_insert(index);
        }
        let weights = vec![0.0; names.len()];
        Self {
            names,
            lookup,
            weights,
        }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn weight(&self, index: usize) -> f32 {
        self.weights.get(index).copied().unwrap_or(0.0)
    }

    pub fn set_weight(&mut self, index: usize, weight: f32) {
        if let Some(slot) = self.weights.get_mut(index) {
            *slot = weight;
        }
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn reset(&mut self) {
        self.weights.fill(0.0);
    }
}
