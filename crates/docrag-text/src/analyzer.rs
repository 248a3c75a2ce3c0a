use docrag_core::error::{Error, Result};
use tantivy::tokenizer::{LowerCaser, RegexTokenizer, StopWordFilter, TextAnalyzer, TokenStream};

/// Words joined by dots stay one token, so `cudaq.sample` is searchable as written.
const TOKEN_PATTERN: &str = r"\w+(?:\.\w+)*";

const STOP_WORDS: &[&str] = &[
	"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
];

/// Lowercasing, stop-word-filtering tokenizer shared by indexing and querying.
#[derive(Clone)]
pub struct Analyzer {
	inner: TextAnalyzer,
}

impl Analyzer {
	pub fn new() -> Result<Self> {
		let tokenizer = RegexTokenizer::new(TOKEN_PATTERN).map_err(|e| Error::Operation(format!("tokenizer: {}", e)))?;
		let inner = TextAnalyzer::builder(tokenizer)
			.filter(LowerCaser)
			.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
			.build();
		Ok(Self { inner })
	}

	/// Query-side terms, exactly as the analyzer emits them.
	pub fn tokenize(&self, text: &str) -> Vec<String> {
		let mut analyzer = self.inner.clone();
		let mut stream = analyzer.token_stream(text);
		let mut out = Vec::new();
		while stream.advance() {
			out.push(stream.token().text.clone());
		}
		out
	}

	/// Index-side terms: dotted tokens are also indexed by their parts, so a
	/// query for `sample` still reaches `cudaq.sample`.
	pub fn index_terms(&self, text: &str) -> Vec<String> {
		let mut out = Vec::new();
		for token in self.tokenize(text) {
			if token.contains('.') {
				out.extend(token.split('.').filter(|p| !p.is_empty() && !STOP_WORDS.contains(p)).map(str::to_string));
			}
			out.push(token);
		}
		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn dotted_identifiers_survive_tokenization() {
		let a = Analyzer::new().unwrap();
		assert_eq!(a.tokenize("Call cudaq.sample(kernel) on the GPU."), vec!["call", "cudaq.sample", "kernel", "gpu"]);
	}

	#[test]
	fn index_terms_add_dotted_parts() {
		let a = Analyzer::new().unwrap();
		assert_eq!(a.index_terms("cudaq.sample"), vec!["cudaq", "sample", "cudaq.sample"]);
	}
}
