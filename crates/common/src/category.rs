use std::fmt;

/// Categoria de dado à qual uma chave está vinculada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    String,
    Hash,
    List,
    SortedSet,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::String => "string",
            Category::Hash => "hash",
            Category::List => "list",
            Category::SortedSet => "zset",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
