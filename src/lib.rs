//! Bookcase – the cataloging engine of a personal library.
//!
//! Two cores make up the crate:
//! * A relational entity store for resources (books and other items), the
//!   persons and groups related to them, the group types classifying groups,
//!   and the objects (files, covers) attached to resources. It is backed by
//!   SQLite and queried through a small criteria algebra.
//! * A template language that turns resource metadata into strings such as
//!   file paths: `{authors#0}/{?series|wrap('@ - ')}{title}`.
//!
//! ## Modules
//! * [`construct`] – The entities, their patch records and well-known group types.
//! * [`datatype`] – Timestamps, publish dates and the enumerations stored as text.
//! * [`entry`] – Field specifications mapping entity properties to columns.
//! * [`persist`] – SQLite schema, versioning and savepoint transactions.
//! * [`criteria`] / [`sort`] – Criteria and sort specifications compiled to SQL.
//! * [`library`] – The [`library::LibraryDatabase`] store with typed CRUD and finders.
//! * [`formatter`] – Tokenizer, parser and evaluator of the template language.
//! * [`resolver`] – Template variables backed by an amalgamated resource.
//! * [`config`] – Layered settings and logging setup.
//!
//! ## Quick Start
//! ```
//! use bookcase::construct::{Person, Resource};
//! use bookcase::datatype::PersonRelation;
//! use bookcase::formatter::Evaluator;
//! use bookcase::library::LibraryDatabase;
//! use bookcase::persist::PersistenceMode;
//! use bookcase::resolver::ResourceResolver;
//!
//! let db = LibraryDatabase::new(PersistenceMode::InMemory).unwrap();
//! let book = db.add_resource(Resource::new("The Stand")).unwrap();
//! let king = db.add_person(Person::new("Stephen King", "King, Stephen")).unwrap();
//! db.add_person_relation(&book, &king, PersonRelation::Author).unwrap();
//!
//! let amalgamated = db.get_amalgamated_resource(&book).unwrap();
//! let evaluator = Evaluator::new(ResourceResolver::new(&amalgamated), false);
//! assert_eq!(evaluator.process("{author}/{title}").unwrap(), "Stephen King/The Stand");
//! ```

pub mod config;
pub mod construct;
pub mod criteria;
pub mod datatype;
pub mod entry;
pub mod error;
pub mod formatter;
pub mod library;
pub mod persist;
pub mod resolver;
pub mod sort;

pub use error::{CatalogError, Result};
pub use library::LibraryDatabase;
