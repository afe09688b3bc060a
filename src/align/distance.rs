/// Levenshtein distance between a fixed target and a sequence that grows one
/// token at a time. Each push costs `O(target.len())`.
#[derive(Debug, Clone)]
pub struct IncrementalDistance<'a> {
    target: &'a [String],
    column: Vec<usize>,
    consumed: usize,
}

impl<'a> IncrementalDistance<'a> {
    pub fn new(target: &'a [String]) -> Self {
        Self {
            target,
            column: (0..=target.len()).collect(),
            consumed: 0,
        }
    }

    pub fn push(&mut self, token: &str) {
        self.consumed += 1;
        let mut diagonal = self.column[0];
        self.column[0] = self.consumed;

        for i in 1..=self.target.len() {
            let above = self.column[i];
            let substitution = diagonal + usize::from(self.target[i - 1] != token);
            self.column[i] = substitution.min(above + 1).min(self.column[i - 1] + 1);
            diagonal = above;
        }
    }

    /// Number of tokens pushed so far.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn distance(&self) -> usize {
        self.column[self.target.len()]
    }

    /// `1 - distance / max(len)`, in `[0, 1]`.
    pub fn similarity(&self) -> f64 {
        let longest = self.target.len().max(self.consumed);
        if longest == 0 {
            return 0.0;
        }
        1.0 - self.distance() as f64 / longest as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levenshtein(a: &[String], b: &[String]) -> usize {
        let mut dist = IncrementalDistance::new(a);
        for token in b {
            dist.push(token);
        }
        dist.distance()
    }

    fn similarity(a: &[String], b: &[String]) -> f64 {
        let mut dist = IncrementalDistance::new(a);
        for token in b {
            dist.push(token);
        }
        dist.similarity()
    }

    fn chars(s: &str) -> Vec<String> {
        s.chars().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_levenshtein_classic() {
        assert_eq!(levenshtein(&chars("kitten"), &chars("sitting")), 3);
        assert_eq!(levenshtein(&chars(""), &chars("abc")), 3);
        assert_eq!(levenshtein(&chars("abc"), &chars("")), 3);
        assert_eq!(levenshtein(&chars("円安です"), &chars("円安です")), 0);
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity(&chars("abc"), &chars("abc")), 1.0);
        assert_eq!(similarity(&chars("abc"), &chars("xyz")), 0.0);
        assert_eq!(similarity(&chars(""), &chars("")), 0.0);
        let partial = similarity(&chars("こんにちは"), &chars("こんにちわ"));
        assert!((partial - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_incremental_matches_batch() {
        let target = chars("今日は経済");
        let mut dist = IncrementalDistance::new(&target);
        for (i, token) in chars("今日わ経済です").iter().enumerate() {
            dist.push(token);
            let prefix: Vec<String> = chars("今日わ経済です")[..=i].to_vec();
            assert_eq!(dist.distance(), levenshtein(&target, &prefix));
        }
        assert_eq!(dist.consumed(), 7);
    }
}
