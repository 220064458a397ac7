// Indentation unit inference and level tracking.
//
// The first indented line locks the unit for the whole file: one tab, or a
// fixed run of two or more spaces. `indent_type` is 0 while undecided, 1 for
// tabs, and the space count otherwise.

pub struct Indent {
    indent_type: usize,
    prev: usize,
    curr: usize,
}

impl Indent {
    pub fn new() -> Self {
        Indent {
            indent_type: 0,
            prev: 0,
            curr: 0,
        }
    }

    pub fn indent_type(&self) -> usize {
        self.indent_type
    }

    pub fn set_type(&mut self, indent_type: usize) {
        self.indent_type = indent_type;
    }

    pub fn type_name(&self) -> &'static str {
        match self.indent_type {
            0 => "undefined",
            1 => "tab",
            _ => "space",
        }
    }

    pub fn curr(&self) -> usize {
        self.curr
    }

    pub fn prev(&self) -> usize {
        self.prev
    }

    /// Convert a leading-whitespace character count into a level.
    pub fn char_count_to_level(&self, chars: usize) -> Result<usize, String> {
        if self.indent_type == 0 {
            return Err("indent type not set".to_string());
        }
        Ok(chars / self.indent_type)
    }

    /// Record the level for the current line, remembering the previous one
    /// for jump validation.
    pub fn set_curr(&mut self, chars: usize) -> Result<usize, String> {
        let level = self.char_count_to_level(chars)?;
        self.prev = self.curr;
        self.curr = level;
        Ok(level)
    }
}

impl Default for Indent {
    fn default() -> Self {
        Indent::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_unit_divides_counts() {
        let mut ind = Indent::new();
        ind.set_type(4);
        assert_eq!(ind.set_curr(0).unwrap(), 0);
        assert_eq!(ind.set_curr(4).unwrap(), 1);
        assert_eq!(ind.set_curr(8).unwrap(), 2);
        assert_eq!(ind.prev(), 1);
    }

    #[test]
    fn test_tab_unit_is_one_char_per_level() {
        let mut ind = Indent::new();
        ind.set_type(1);
        assert_eq!(ind.set_curr(3).unwrap(), 3);
    }

    #[test]
    fn test_undecided_unit_is_an_error() {
        let ind = Indent::new();
        assert!(ind.char_count_to_level(2).is_err());
    }
}
