/// One decoder output spanning `[start_sample, end_sample]`. `texts` holds
/// the same annotation at decreasing lengths so a renderer can pick the
/// longest one that fits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Annotation {
    start_sample: u64,
    end_sample: u64,
    format: i32,
    texts: Vec<String>,
}

impl Annotation {
    pub fn new(start_sample: u64, end_sample: u64, format: i32, texts: Vec<String>) -> Self {
        assert!(
            start_sample <= end_sample,
            "annotation ends before it starts ({start_sample} > {end_sample})"
        );
        Self {
            start_sample,
            end_sample,
            format,
            texts,
        }
    }

    pub fn start_sample(&self) -> u64 {
        self.start_sample
    }

    pub fn end_sample(&self) -> u64 {
        self.end_sample
    }

    pub fn format(&self) -> i32 {
        self.format
    }

    pub fn annotations(&self) -> &[String] {
        &self.texts
    }

    pub fn span(&self) -> u64 {
        self.end_sample - self.start_sample
    }
}
