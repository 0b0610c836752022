use crate::pp::pp_lexer::PPToken;
use crate::pp::preprocessor::{MacroArgs, MacroInfo, MacroTable};

/// Hook invoked while the preprocessor expands a function-like macro.
///
/// Subscribers are registered with [`Preprocessor::add_pp_callbacks`] and
/// live as long as the preprocessor. During dispatch the expanding
/// definition has been taken out of `table`, so a callback may append to
/// `def` and install a successor definition under the same name without
/// aliasing.
///
/// [`Preprocessor::add_pp_callbacks`]: crate::pp::Preprocessor::add_pp_callbacks
pub trait PPCallbacks {
    fn macro_expands(
        &mut self,
        name_tok: &PPToken,
        def: &mut MacroInfo,
        args: &MacroArgs,
        table: &mut MacroTable,
    );
}
