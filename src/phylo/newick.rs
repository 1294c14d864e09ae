//! Newick parser
//!
//! Handles the dialect produced by common phylogenetics tools:
//! `((A:0.1,B:0.2)ab:0.3,(C:0.4,D:0.5):0.6);` plus single-quoted labels
//! (`'Malus domestica'`, with `''` as an escaped quote) and `[...]`
//! comments. Labels are kept verbatim; underscores are not rewritten.

use super::tree::PhyloTree;
use crate::error::{ScoringError, ScoringResult};

/// Parse a Newick string into a validated tree
pub fn parse(newick: &str) -> ScoringResult<PhyloTree> {
    let mut parser = Parser {
        src: newick,
        pos: 0,
        parents: Vec::new(),
        lengths: Vec::new(),
        labels: Vec::new(),
    };
    parser.run()?;
    PhyloTree::from_parts(parser.parents, parser.lengths, parser.labels)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    parents: Vec<Option<usize>>,
    lengths: Vec<f64>,
    labels: Vec<String>,
}

impl<'a> Parser<'a> {
    fn run(&mut self) -> ScoringResult<()> {
        let mut open: Vec<usize> = Vec::new();
        // True right after '(' or ',' where a child is expected.
        let mut expect_child = false;
        let mut root_closed = false;

        loop {
            self.skip_trivia()?;
            let Some(c) = self.peek() else { break };
            match c {
                '(' => {
                    if root_closed {
                        return Err(self.error("content after the root clade"));
                    }
                    if !open.is_empty() && !expect_child {
                        return Err(self.error("expected ',' or ')'"));
                    }
                    let node = self.push_node(open.last().copied());
                    open.push(node);
                    self.pos += 1;
                    expect_child = true;
                }
                ',' => {
                    if open.is_empty() {
                        return Err(self.error("',' outside of a clade"));
                    }
                    if expect_child {
                        self.push_node(open.last().copied());
                    }
                    self.pos += 1;
                    expect_child = true;
                }
                ')' => {
                    let Some(closed) = open.pop() else {
                        return Err(self.error("unbalanced ')'"));
                    };
                    if expect_child {
                        self.push_node(Some(closed));
                    }
                    self.pos += 1;
                    self.read_label_and_length(closed)?;
                    expect_child = false;
                    if open.is_empty() {
                        root_closed = true;
                    }
                }
                ';' => {
                    self.pos += 1;
                    break;
                }
                _ => {
                    if root_closed || (open.is_empty() && !self.parents.is_empty()) {
                        return Err(self.error("content after the root clade"));
                    }
                    if !open.is_empty() && !expect_child {
                        return Err(self.error("expected ',' or ')'"));
                    }
                    let node = self.push_node(open.last().copied());
                    self.read_label_and_length(node)?;
                    expect_child = false;
                    if open.is_empty() {
                        root_closed = true;
                    }
                }
            }
        }

        if !open.is_empty() {
            return Err(self.error("unbalanced '(' (missing ')')"));
        }
        if self.parents.is_empty() {
            return Err(ScoringError::MalformedTree("empty tree".into()));
        }

        self.skip_trivia()?;
        if self.pos < self.src.len() {
            return Err(self.error("trailing content after ';'"));
        }
        Ok(())
    }

    fn push_node(&mut self, parent: Option<usize>) -> usize {
        self.parents.push(parent);
        self.lengths.push(0.0);
        self.labels.push(String::new());
        self.parents.len() - 1
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn error(&self, what: &str) -> ScoringError {
        ScoringError::MalformedTree(format!("{what} at byte {}", self.pos))
    }

    /// Skip whitespace and `[...]` comments
    fn skip_trivia(&mut self) -> ScoringResult<()> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => self.pos += c.len_utf8(),
                Some('[') => match self.src[self.pos..].find(']') {
                    Some(end) => self.pos += end + 1,
                    None => return Err(self.error("unterminated comment")),
                },
                _ => return Ok(()),
            }
        }
    }

    fn read_label_and_length(&mut self, node: usize) -> ScoringResult<()> {
        self.skip_trivia()?;
        self.labels[node] = self.read_label()?;
        self.skip_trivia()?;
        if self.peek() == Some(':') {
            self.pos += 1;
            self.skip_trivia()?;
            self.lengths[node] = self.read_length()?;
        }
        Ok(())
    }

    fn read_label(&mut self) -> ScoringResult<String> {
        if self.peek() == Some('\'') {
            self.pos += 1;
            let mut label = String::new();
            loop {
                let Some(c) = self.peek() else {
                    return Err(self.error("unterminated quoted label"));
                };
                self.pos += c.len_utf8();
                if c == '\'' {
                    if self.peek() == Some('\'') {
                        label.push('\'');
                        self.pos += 1;
                    } else {
                        return Ok(label);
                    }
                } else {
                    label.push(c);
                }
            }
        }

        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_delimiter(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn read_length(&mut self) -> ScoringResult<f64> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_delimiter(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        let text = &self.src[start..self.pos];
        let value: f64 = text
            .parse()
            .map_err(|_| ScoringError::MalformedTree(format!("invalid branch length '{text}' at byte {start}")))?;
        if !value.is_finite() || value < 0.0 {
            return Err(ScoringError::MalformedTree(format!(
                "branch length {value} at byte {start} must be finite and non-negative"
            )));
        }
        Ok(value)
    }
}

fn is_delimiter(c: char) -> bool {
    matches!(c, '(' | ')' | ',' | ':' | ';' | '[' | '\'') || c.is_whitespace()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_simple_tree() {
        let tree = parse("((A:0.1,B:0.2)ab:0.3,(C:0.4,D:0.5):0.6);").unwrap();
        assert_eq!(tree.num_leaves(), 4);
        assert_eq!(tree.num_nodes(), 7);
        assert_relative_eq!(tree.total_branch_length(), 2.1, epsilon = 1e-12);

        let a = tree.leaf_idx("A").unwrap();
        let ab = tree.node(a).parent.unwrap();
        assert_eq!(tree.node(ab).label, "ab");
        assert_relative_eq!(tree.node(ab).branch_length, 0.3);
    }

    #[test]
    fn test_quoted_labels_and_comments() {
        let tree = parse("('Malus domestica':1,[note]'O''Brien':2[&&NHX])root;").unwrap();
        assert!(tree.leaf_idx("Malus domestica").is_some());
        assert!(tree.leaf_idx("O'Brien").is_some());
        assert_eq!(tree.node(tree.root()).label, "root");
    }

    #[test]
    fn test_missing_lengths_default_to_zero() {
        let tree = parse("(A,B:1.0);").unwrap();
        let a = tree.leaf_idx("A").unwrap();
        assert_eq!(tree.node(a).branch_length, 0.0);
    }

    #[test]
    fn test_single_leaf_tree() {
        let tree = parse("A;").unwrap();
        assert_eq!(tree.num_nodes(), 1);
        assert_eq!(tree.leaf_idx("A"), Some(0));
    }

    #[test]
    fn test_malformed_inputs() {
        let bad = [
            "",
            ";",
            "((A:1,B:1);",
            "(A:1,B:1));",
            "(A:1,B:1);(C:1);",
            "(A:1,B:1)C;extra",
            "(A:x,B:1);",
            "(A:-1,B:1);",
            "(A:1,A:1);",
            "(A:1,'B:1);",
            "(A:1,B:1)[unterminated;",
            "(A B);",
        ];
        for input in bad {
            assert!(
                matches!(parse(input), Err(ScoringError::MalformedTree(_))),
                "expected failure for {input:?}"
            );
        }
    }

    #[test]
    fn test_whitespace_and_empty_children() {
        let tree = parse(" ( A : 1 ,\n B : 2 , ) ; ").unwrap();
        // The empty child becomes an unlabelled leaf.
        assert_eq!(tree.num_nodes(), 4);
        assert_eq!(tree.num_leaves(), 2);
    }
}
