//! The token stream contract shared by every reader.

use std::borrow::Cow;

use crate::error::IonResult;
use crate::types::{Decimal, IonType, Symbol, Timestamp, Token};

/// A pull-based stream of [`Token`]s.
///
/// The raw binary tokenizer, the template interpreter, element replay and
/// the expanding reader all implement this trait, so a consumer cannot tell
/// expanded values from values that were written out in full.
///
/// `next_token` returns [`Token::End`] at the end of the current container
/// and at the end of the stream. A value that is not read before the next
/// call to `next_token` is skipped. Each `read_*` call is valid once per
/// token.
pub trait TokenSource {
    fn next_token(&mut self) -> IonResult<Token>;

    /// Discards the current value, including a field name or annotations
    /// that precede it.
    fn skip(&mut self) -> IonResult<()>;

    /// Returns the type of the current null.
    fn read_null(&mut self) -> IonResult<IonType>;
    fn read_bool(&mut self) -> IonResult<bool>;
    fn read_int(&mut self) -> IonResult<i128>;
    fn read_float(&mut self) -> IonResult<f64>;
    fn read_decimal(&mut self) -> IonResult<Decimal>;
    fn read_timestamp(&mut self) -> IonResult<Timestamp>;
    fn read_string(&mut self) -> IonResult<Cow<'_, str>>;
    fn read_symbol(&mut self) -> IonResult<Symbol>;
    /// Reads the bytes of a blob or clob.
    fn read_lob(&mut self) -> IonResult<Cow<'_, [u8]>>;
    fn read_annotations(&mut self) -> IonResult<Vec<Symbol>>;
    fn read_field_name(&mut self) -> IonResult<Symbol>;

    fn step_in(&mut self) -> IonResult<()>;
    /// Leaves the current container, skipping whatever was not read.
    fn step_out(&mut self) -> IonResult<()>;
    /// Current container nesting, 0 at the top level.
    fn depth(&self) -> usize;
}
