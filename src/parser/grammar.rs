//! Query grammar
//!
//! A recursive descent parser over the token stream:
//!
//! ```text
//! root      := statement (';' statement)* [';']
//! statement := DESC schema_call
//!            | [WITH cte (',' cte)*] set_expr
//! cte       := ident AS '(' set_expr ')'
//! set_expr  := query (set_op '(' ident (',' ident)* ')' query)*
//! query     := SELECT fields FROM from [WHERE expr]
//!              [GROUP BY expr (',' expr)* [HAVING expr]] [SKIP int] [TAKE int]
//! from      := source ([INNER] JOIN source ON expr)*
//! source    := schema_call [alias]
//!            | ident [alias]
//! schema_call := '#' ident '.' ident '(' [literal (',' literal)*] ')'
//! ```
//!
//! Inside expressions, `expr [NOT] IN '(' expr (',' expr)* ')'` binds like
//! a comparison.

use crate::error::{Error, ErrorCode, Result};
use crate::parser::ast::*;
use crate::parser::tokenizer::{tokenize, Token, TokenKind};

// ============================================================================
// Parser
// ============================================================================

/// Query parser
pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser for the given query text
    pub fn new(source: &'a str) -> Result<Self> {
        let tokens = tokenize(source)?;
        Ok(Parser {
            source,
            tokens,
            pos: 0,
        })
    }

    /// Parse every statement in the source
    pub fn parse_root(&mut self) -> Result<Root> {
        let mut statements = Vec::new();

        loop {
            self.skip_semicolons();
            if self.is_eof() {
                break;
            }
            statements.push(self.parse_statement()?);
            if !self.is_eof() && !self.check(TokenKind::Semicolon) {
                return Err(self.error("expected ';' or end of input"));
            }
        }

        if statements.is_empty() {
            return Err(self.error("expected statement"));
        }
        Ok(Root { statements })
    }

    /// Check if at end of file
    pub fn is_eof(&self) -> bool {
        self.current().kind == TokenKind::Eof
    }

    // ========================================================================
    // Statement Parsers
    // ========================================================================

    fn parse_statement(&mut self) -> Result<Statement> {
        if self.match_token(TokenKind::Desc) {
            if !self.check(TokenKind::Hash) {
                return Err(self.error("expected '#schema.method(...)' after DESC"));
            }
            let (schema, method, args) = self.parse_schema_call()?;
            return Ok(Statement::Desc(Describe {
                schema,
                method,
                args,
            }));
        }

        let mut ctes = Vec::new();
        if self.match_token(TokenKind::With) {
            loop {
                ctes.push(self.parse_cte()?);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }

        let body = self.parse_set_expr()?;
        Ok(Statement::Query(QueryStatement { ctes, body }))
    }

    fn parse_cte(&mut self) -> Result<Cte> {
        let name = self.expect_identifier()?;
        self.expect(TokenKind::As)?;
        self.expect(TokenKind::LParen)?;
        let body = self.parse_set_expr()?;
        self.expect(TokenKind::RParen)?;
        Ok(Cte { name, body })
    }

    fn parse_set_expr(&mut self) -> Result<SetExpr> {
        let mut left = SetExpr::Query(Box::new(self.parse_query()?));

        while let Some(op) = self.parse_set_operator() {
            self.expect(TokenKind::LParen)?;
            let mut keys = vec![self.expect_identifier()?];
            while self.match_token(TokenKind::Comma) {
                keys.push(self.expect_identifier()?);
            }
            self.expect(TokenKind::RParen)?;

            let right = SetExpr::Query(Box::new(self.parse_query()?));
            left = SetExpr::Operation {
                op,
                keys,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_set_operator(&mut self) -> Option<SetOperator> {
        if self.match_token(TokenKind::Union) {
            if self.match_token(TokenKind::All) {
                Some(SetOperator::UnionAll)
            } else {
                Some(SetOperator::Union)
            }
        } else if self.match_token(TokenKind::Except) {
            Some(SetOperator::Except)
        } else if self.match_token(TokenKind::Intersect) {
            Some(SetOperator::Intersect)
        } else {
            None
        }
    }

    fn parse_query(&mut self) -> Result<Query> {
        self.expect(TokenKind::Select)?;
        let fields = self.parse_select_items()?;

        self.expect(TokenKind::From)?;
        let from = self.parse_from()?;

        let where_clause = if self.match_token(TokenKind::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let group_by = if self.match_token(TokenKind::Group) {
            self.expect(TokenKind::By)?;
            let mut keys = vec![self.parse_expr()?];
            while self.match_token(TokenKind::Comma) {
                keys.push(self.parse_expr()?);
            }
            let having = if self.match_token(TokenKind::Having) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            Some(GroupBy { keys, having })
        } else {
            None
        };

        let skip = if self.match_token(TokenKind::Skip) {
            Some(self.expect_count()?)
        } else {
            None
        };
        let take = if self.match_token(TokenKind::Take) {
            Some(self.expect_count()?)
        } else {
            None
        };

        Ok(Query {
            fields,
            from,
            where_clause,
            group_by,
            skip,
            take,
        })
    }

    fn parse_select_items(&mut self) -> Result<Vec<SelectItem>> {
        let mut items = vec![self.parse_select_item()?];
        while self.match_token(TokenKind::Comma) {
            items.push(self.parse_select_item()?);
        }
        Ok(items)
    }

    fn parse_select_item(&mut self) -> Result<SelectItem> {
        if self.match_token(TokenKind::Star) {
            return Ok(SelectItem::Star);
        }
        let expr = self.parse_expr()?;
        let alias = self.parse_alias()?;
        Ok(SelectItem::Expr { expr, alias })
    }

    fn parse_alias(&mut self) -> Result<Option<String>> {
        if self.match_token(TokenKind::As) {
            return Ok(Some(self.expect_identifier()?));
        }
        if self.check(TokenKind::Identifier) {
            return Ok(Some(self.expect_identifier()?));
        }
        Ok(None)
    }

    // ========================================================================
    // FROM
    // ========================================================================

    fn parse_from(&mut self) -> Result<FromSource> {
        let mut left = self.parse_source()?;

        loop {
            if self.match_token(TokenKind::Inner) {
                self.expect(TokenKind::Join)?;
            } else if !self.match_token(TokenKind::Join) {
                break;
            }
            let right = self.parse_source()?;
            self.expect(TokenKind::On)?;
            let on = self.parse_expr()?;
            left = FromSource::Join {
                left: Box::new(left),
                right: Box::new(right),
                on,
            };
        }

        Ok(left)
    }

    /// `#schema.method(literal, ...)`
    fn parse_schema_call(&mut self) -> Result<(String, String, Vec<Literal>)> {
        self.expect(TokenKind::Hash)?;
        let schema = self.expect_identifier()?;
        self.expect(TokenKind::Dot)?;
        let method = self.expect_identifier()?;
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            args.push(self.parse_literal()?);
            while self.match_token(TokenKind::Comma) {
                args.push(self.parse_literal()?);
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok((schema, method, args))
    }

    fn parse_source(&mut self) -> Result<FromSource> {
        if self.check(TokenKind::Hash) {
            let (schema, method, args) = self.parse_schema_call()?;
            let alias = self.parse_alias()?;
            return Ok(FromSource::Schema {
                schema,
                method,
                args,
                alias,
            });
        }

        let name = self.expect_identifier()?;
        let alias = self.parse_alias()?;
        Ok(FromSource::Named { name, alias })
    }

    fn parse_literal(&mut self) -> Result<Literal> {
        let negative = self.match_token(TokenKind::Minus);
        let literal = match self.current().kind {
            TokenKind::Integer => Literal::Integer(self.parse_integer_token(negative)?),
            TokenKind::Float => {
                let value: f64 = self.current_text().parse().map_err(|_| self.error("invalid number"))?;
                self.advance();
                Literal::Real(if negative { -value } else { value })
            }
            TokenKind::String if !negative => {
                let text = unquote(self.current_text());
                self.advance();
                Literal::Text(text)
            }
            TokenKind::True if !negative => {
                self.advance();
                Literal::Boolean(true)
            }
            TokenKind::False if !negative => {
                self.advance();
                Literal::Boolean(false)
            }
            _ => return Err(self.error("expected literal")),
        };
        Ok(literal)
    }

    fn parse_integer_token(&mut self, negative: bool) -> Result<i64> {
        let text = self.current_text();
        let parsed = if negative {
            format!("-{}", text).parse::<i64>()
        } else {
            text.parse::<i64>()
        };
        let value = parsed.map_err(|_| self.error("integer literal out of range"))?;
        self.advance();
        Ok(value)
    }

    fn expect_count(&mut self) -> Result<i64> {
        if !self.check(TokenKind::Integer) {
            return Err(self.error("expected row count"));
        }
        self.parse_integer_token(false)
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or_expr()
    }

    fn parse_or_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_and_expr()?;

        while self.match_token(TokenKind::Or) {
            let right = self.parse_and_expr()?;
            left = Expr::binary(BinaryOp::Or, left, right);
        }

        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_not_expr()?;

        while self.match_token(TokenKind::And) {
            let right = self.parse_not_expr()?;
            left = Expr::binary(BinaryOp::And, left, right);
        }

        Ok(left)
    }

    fn parse_not_expr(&mut self) -> Result<Expr> {
        if self.match_token(TokenKind::Not) {
            let expr = self.parse_not_expr()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            });
        }

        self.parse_comparison_expr()
    }

    fn parse_comparison_expr(&mut self) -> Result<Expr> {
        let left = self.parse_additive_expr()?;

        let op = match self.current().kind {
            TokenKind::Eq | TokenKind::EqEq => BinaryOp::Eq,
            TokenKind::Ne | TokenKind::BangEq => BinaryOp::Ne,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            TokenKind::Like => BinaryOp::Like,
            TokenKind::In => {
                self.advance();
                return self.parse_in_list(left);
            }
            TokenKind::Not if self.peek().kind == TokenKind::In => {
                self.advance();
                self.advance();
                let contains = self.parse_in_list(left)?;
                return Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(contains),
                });
            }
            TokenKind::Not if self.peek().kind == TokenKind::Like => {
                self.advance();
                self.advance();
                let right = self.parse_additive_expr()?;
                return Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(Expr::binary(BinaryOp::Like, left, right)),
                });
            }
            _ => return Ok(left),
        };
        self.advance();

        let right = self.parse_additive_expr()?;
        Ok(Expr::binary(op, left, right))
    }

    fn parse_in_list(&mut self, left: Expr) -> Result<Expr> {
        self.expect(TokenKind::LParen)?;
        let mut list = vec![self.parse_additive_expr()?];
        while self.match_token(TokenKind::Comma) {
            list.push(self.parse_additive_expr()?);
        }
        self.expect(TokenKind::RParen)?;
        Ok(Expr::In {
            expr: Box::new(left),
            list,
        })
    }

    fn parse_additive_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative_expr()?;

        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative_expr()?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_multiplicative_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary_expr()?;

        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary_expr()?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_unary_expr(&mut self) -> Result<Expr> {
        if self.match_token(TokenKind::Minus) {
            let expr = self.parse_unary_expr()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(expr),
            });
        }
        if self.match_token(TokenKind::Plus) {
            return self.parse_unary_expr();
        }
        self.parse_primary_expr()
    }

    fn parse_primary_expr(&mut self) -> Result<Expr> {
        match self.current().kind {
            TokenKind::Integer
            | TokenKind::Float
            | TokenKind::String
            | TokenKind::True
            | TokenKind::False => Ok(Expr::Literal(self.parse_literal()?)),
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::Parens(Box::new(expr)))
            }
            TokenKind::Identifier => {
                let first = self.expect_identifier()?;
                if self.check(TokenKind::LParen) {
                    let args = self.parse_call_args()?;
                    return Ok(Expr::Call {
                        alias: None,
                        name: first,
                        args,
                    });
                }
                if self.match_token(TokenKind::Dot) {
                    let second = self.expect_identifier()?;
                    if self.check(TokenKind::LParen) {
                        let args = self.parse_call_args()?;
                        return Ok(Expr::Call {
                            alias: Some(first),
                            name: second,
                            args,
                        });
                    }
                    return Ok(Expr::Column {
                        alias: Some(first),
                        name: second,
                    });
                }
                Ok(Expr::Column {
                    alias: None,
                    name: first,
                })
            }
            _ => Err(self.error("expected expression")),
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            args.push(self.parse_expr()?);
            while self.match_token(TokenKind::Comma) {
                args.push(self.parse_expr()?);
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    // ========================================================================
    // Token Helpers
    // ========================================================================

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn current_text(&self) -> &str {
        self.current().text(self.source)
    }

    fn peek(&self) -> &Token {
        if self.pos + 1 < self.tokens.len() {
            &self.tokens[self.pos + 1]
        } else {
            &self.tokens[self.tokens.len() - 1]
        }
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<()> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("expected {:?}", kind)))
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        if !self.check(TokenKind::Identifier) {
            return Err(self.error("expected identifier"));
        }
        let text = self.current_text();
        let name = if text.starts_with('[') && text.ends_with(']') && text.len() >= 2 {
            text[1..text.len() - 1].to_string()
        } else {
            text.to_string()
        };
        self.advance();
        Ok(name)
    }

    fn skip_semicolons(&mut self) {
        while self.match_token(TokenKind::Semicolon) {}
    }

    fn error(&self, msg: &str) -> Error {
        let token = self.current();
        let found = if token.kind == TokenKind::Eof {
            "end of input".to_string()
        } else {
            format!("'{}'", token.text(self.source))
        };
        Error::with_message(
            ErrorCode::Syntax,
            format!(
                "{} at line {}, column {}, found {}",
                msg, token.line, token.column, found
            ),
        )
    }
}

/// Strip the quotes of a string literal and collapse doubled quotes
fn unquote(text: &str) -> String {
    let inner = text
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .unwrap_or(text);
    inner.replace("''", "'")
}

// ============================================================================
// Public API
// ============================================================================

/// Parse query text into statements
pub fn parse(source: &str) -> Result<Root> {
    let mut parser = Parser::new(source)?;
    let root = parser.parse_root()?;
    tracing::debug!(target: "tabql::parse", "parsed {} statement(s)", root.statements.len());
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_query(source: &str) -> Query {
        let mut root = parse(source).unwrap();
        assert_eq!(root.statements.len(), 1);
        match root.statements.remove(0) {
            Statement::Query(QueryStatement {
                body: SetExpr::Query(query),
                ..
            }) => *query,
            other => panic!("expected query, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_simple_select() {
        let query = single_query("select Name from #test.entities() where Population > 1000");
        assert_eq!(query.fields.len(), 1);
        assert!(matches!(
            query.from,
            FromSource::Schema { ref schema, ref method, .. } if schema == "test" && method == "entities"
        ));
        assert_eq!(query.where_clause.unwrap().to_string(), "Population > 1000");
    }

    #[test]
    fn test_parse_schema_args_and_alias() {
        let query = single_query("select * from #csv.file('a.csv', ',', true, -1) as c");
        match query.from {
            FromSource::Schema { args, alias, .. } => {
                assert_eq!(
                    args,
                    vec![
                        Literal::Text("a.csv".into()),
                        Literal::Text(",".into()),
                        Literal::Boolean(true),
                        Literal::Integer(-1),
                    ]
                );
                assert_eq!(alias.as_deref(), Some("c"));
            }
            other => panic!("expected schema source, got {:?}", other),
        }
        assert_eq!(query.fields, vec![SelectItem::Star]);
    }

    #[test]
    fn test_parse_group_skip_take() {
        let query = single_query(
            "select Country, Sum(Population) as Total from #test.entities() \
             group by Country having Sum(Population) > 10 skip 1 take 2",
        );
        let group = query.group_by.unwrap();
        assert_eq!(group.keys.len(), 1);
        assert!(group.having.is_some());
        assert_eq!(query.skip, Some(1));
        assert_eq!(query.take, Some(2));
        match &query.fields[1] {
            SelectItem::Expr { alias, .. } => assert_eq!(alias.as_deref(), Some("Total")),
            other => panic!("unexpected field {:?}", other),
        }
    }

    #[test]
    fn test_parse_join_chain_is_left_deep() {
        let query = single_query(
            "select a.Name from #test.entities() a inner join #test.entities() b on a.Id = b.Id \
             join #test.entities() c on b.Id = c.Id",
        );
        match query.from {
            FromSource::Join { left, right, .. } => {
                assert!(matches!(*left, FromSource::Join { .. }));
                assert!(matches!(*right, FromSource::Schema { .. }));
            }
            other => panic!("expected join, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_set_operators_left_associative() {
        let root = parse(
            "select Id from #t.a() union (Id) select Id from #t.b() except (Id) select Id from #t.c()",
        )
        .unwrap();
        match &root.statements[0].as_query().unwrap().body {
            SetExpr::Operation { op, left, keys, .. } => {
                assert_eq!(*op, SetOperator::Except);
                assert_eq!(keys, &vec!["Id".to_string()]);
                assert!(matches!(
                    **left,
                    SetExpr::Operation { op: SetOperator::Union, .. }
                ));
            }
            other => panic!("expected operation, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_union_all() {
        let root = parse("select Id from #t.a() union all (Id) select Id from #t.b()").unwrap();
        assert!(matches!(
            root.statements[0].as_query().unwrap().body,
            SetExpr::Operation { op: SetOperator::UnionAll, .. }
        ));
    }

    #[test]
    fn test_parse_cte_and_multiple_statements() {
        let root = parse(
            "with p as (select Name from #t.a()) select Name from p; select 1 from #t.b();",
        )
        .unwrap();
        assert_eq!(root.statements.len(), 2);
        let first = root.statements[0].as_query().unwrap();
        assert_eq!(first.ctes.len(), 1);
        assert_eq!(first.ctes[0].name, "p");
    }

    #[test]
    fn test_parse_not_like_and_precedence() {
        let query = single_query(
            "select Name from #t.a() where Name not like 'W%' and 1 + 2 * 3 = 7 or not true",
        );
        assert_eq!(
            query.where_clause.unwrap().to_string(),
            "not Name like 'W%' and 1 + 2 * 3 = 7 or not true"
        );
    }

    #[test]
    fn test_parse_in_list() {
        let query = single_query(
            "select Name from #t.a() where Country in ('Poland', 'Germany') and Id not in (1, 2 + 1)",
        );
        assert_eq!(
            query.where_clause.unwrap().to_string(),
            "Country in ('Poland', 'Germany') and not Id in (1, 2 + 1)"
        );
        assert_eq!(
            parse("select Name from #t.a() where Id in ()").unwrap_err().code,
            ErrorCode::Syntax
        );
    }

    #[test]
    fn test_parse_desc() {
        let root = parse("desc #csv.file('a.csv', ',', true, 0); select Name from #t.a()").unwrap();
        assert_eq!(root.statements.len(), 2);
        match &root.statements[0] {
            Statement::Desc(desc) => {
                assert_eq!(desc.schema, "csv");
                assert_eq!(desc.method, "file");
                assert_eq!(desc.args.len(), 4);
            }
            other => panic!("expected desc, got {:?}", other),
        }
        assert_eq!(parse("desc entities").unwrap_err().code, ErrorCode::Syntax);
    }

    #[test]
    fn test_parse_qualified_call() {
        let query = single_query("select a.ToUpper(a.City) from #t.a() a");
        match &query.fields[0] {
            SelectItem::Expr { expr, .. } => assert_eq!(expr.to_string(), "a.ToUpper(a.City)"),
            other => panic!("unexpected field {:?}", other),
        }
    }

    #[test]
    fn test_syntax_errors_report_position() {
        let err = parse("select Name #t.a()").unwrap_err();
        assert_eq!(err.code, ErrorCode::Syntax);
        assert!(err.message.contains("line 1, column 13"), "{}", err.message);

        assert_eq!(parse("").unwrap_err().code, ErrorCode::Syntax);
        assert_eq!(parse("select from #t.a()").unwrap_err().code, ErrorCode::Syntax);
        assert_eq!(
            parse("select Name from #t.a() take x").unwrap_err().code,
            ErrorCode::Syntax
        );
    }

    #[test]
    fn test_bracketed_identifier() {
        let query = single_query("select [Order Date] from #t.a()");
        match &query.fields[0] {
            SelectItem::Expr { expr, .. } => assert_eq!(expr, &Expr::column("Order Date")),
            other => panic!("unexpected field {:?}", other),
        }
    }
}
